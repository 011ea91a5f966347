//! SeaORM entities backing `SeaOrmStore`.

pub mod consumption_stats;
pub mod system_draft;
pub mod variance_event;
pub mod working_copy;
