use crate::store::{data::ExecStep, db::mem::DbDocument};

impl DbDocument for ExecStep {
    fn id(&self) -> &str {
        &self.id
    }
}
