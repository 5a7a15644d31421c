mod articles;
mod batch;
mod changes;
mod joins;
mod tags;
mod updater;

pub use articles::{reconcile_article, PassState};
pub use batch::{FlushStats, PageBatch};
pub use changes::{ChangeKind, ChangeSet};
pub use joins::{plan_joins, reconcile_joins, JoinChanges, JoinPlan};
pub use tags::{PendingTags, TagIndex, TagResolution};
pub use updater::{SyncMode, Updater};
