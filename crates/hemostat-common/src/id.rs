use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

// Fallback identity for processes that never call `init`. Tokens stay
// process-unique either way; collisions across processes need init
// with distinct node IDs.
const DEFAULT_MACHINE_ID: i32 = 1;
const DEFAULT_NODE_ID: i32 = 1;

static GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Initialize the snowflake generator for this process.
///
/// `machine_id` and `node_id` are both in 0-31. Responders running side
/// by side must be given distinct node IDs: their single-writer lock
/// tokens come from this generator, and colliding tokens would weaken
/// the per-container guard.
pub fn init(machine_id: i32, node_id: i32) {
    *GENERATOR.lock().unwrap() = Some(SnowflakeIdBucket::new(machine_id, node_id));
}

/// Next process-unique ID, used for single-writer lock tokens and audit
/// entry identifiers. The decimal form is safe to embed in the
/// colon-delimited store keys.
pub fn next_id() -> String {
    let mut guard = GENERATOR.lock().unwrap();
    guard
        .get_or_insert_with(|| SnowflakeIdBucket::new(DEFAULT_MACHINE_ID, DEFAULT_NODE_ID))
        .get_id()
        .to_string()
}
