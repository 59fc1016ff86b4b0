use crate::store::{data::Workflow, db::mem::DbDocument};

impl DbDocument for Workflow {
    fn id(&self) -> &str {
        &self.id
    }
}
