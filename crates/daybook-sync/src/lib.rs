mod coordinator;
mod filter;
mod mutation;
mod select;

pub use coordinator::{LoadState, SettleReport, SyncCoordinator, SyncEvent};
pub use filter::{
    CommentOrder, Filter, TimeWindow, all_tags, project, project_in, sorted_comments,
};
pub use mutation::MutationKind;
pub use select::{Backend, select_store};
