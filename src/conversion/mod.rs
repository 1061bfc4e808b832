//! Planning of aggregate changes into ordered database actions.

pub mod action;
pub mod change;
pub mod delete_writer;
pub mod writer;

pub use action::{
    AcquireLockAllRoot, AcquireLockRoot, ActionId, BatchDelete, BatchDeleteRoot, BatchInsert,
    BatchInsertRoot, DbAction, Delete, DeleteAll, DeleteAllRoot, DeleteRoot, IdValueSource,
    Insert, InsertRoot, Update, UpdateRoot,
};
pub use change::{AggregateChange, BatchingAggregateChange, ChangeKind, RootAggregateChange};
pub use delete_writer::RelationalEntityDeleteWriter;
pub use writer::{
    is_new, EntityWriter, RelationalEntityInsertWriter, RelationalEntityUpdateWriter,
    RelationalEntityWriter,
};
