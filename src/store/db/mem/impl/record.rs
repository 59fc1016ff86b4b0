use crate::store::{data::ExecRecord, db::mem::DbDocument};

impl DbDocument for ExecRecord {
    fn id(&self) -> &str {
        &self.id
    }
}
