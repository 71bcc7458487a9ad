pub(crate) mod feed;
pub(crate) mod note;
pub(crate) mod profile;
