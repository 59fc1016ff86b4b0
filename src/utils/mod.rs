pub mod time;

/// Short random id used for durable record and step rows.
pub fn longid() -> String {
    nanoid::nanoid!()
}

/// Execute ids are uuid v4 strings.
pub fn execute_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
