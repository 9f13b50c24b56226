//! Redis-backed session registry.
//!
//! One hash per session, keyed by the bare session name (the launched viewer
//! looks it up that way). Sessions with an unfinished teardown are also kept
//! in a side set so the reaper can find them without scanning the keyspace.
//!
//! Only `create_session` may create a hash. Every other write runs in a
//! script that fails when the hash is gone, so a late write for a reaped
//! session cannot leave a partial record behind. The viewer container
//! writes its `viewer` field with a plain `HSET` and is not covered by this.

use crate::record_schema::{self, LIFECYCLE_FIELD, VIEWER_CONTAINER_FIELD, VIEWER_FIELD};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use vizor_core::registry::SessionRegistry;
use vizor_core::session::{LayerKind, Lifecycle, SessionName, SessionRecord, ViewerInfo};
use vizor_core::{Result, VizorError};

/// Set holding the names of sessions in `Reaping`.
pub const TEARDOWN_SET_KEY: &str = "vizor:teardown";

/// Bumps the layer count and writes the new layer's fields in one step.
/// Arguments come from [`record_schema::append_layer_args`].
const APPEND_LAYER_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return redis.error_reply('no record for session ' .. KEYS[1])
end
local n = redis.call('HINCRBY', KEYS[1], ARGV[1], 1)
for i = 2, #ARGV, 3 do
    redis.call('HSET', KEYS[1], ARGV[i] .. n .. ARGV[i + 1], ARGV[i + 2])
end
return n
";

/// Sets one field of an existing record and updates its teardown-set
/// membership (`KEYS[2]`) as `ARGV[3]` says.
const SET_FIELD_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return redis.error_reply('no record for session ' .. KEYS[1])
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
if ARGV[3] == 'add' then
    redis.call('SADD', KEYS[2], KEYS[1])
elseif ARGV[3] == 'remove' then
    redis.call('SREM', KEYS[2], KEYS[1])
end
return 1
";

#[derive(Debug, Clone, Copy)]
enum Teardown {
    Keep,
    Add,
    Remove,
}

impl Teardown {
    fn as_arg(self) -> &'static str {
        match self {
            Teardown::Keep => "",
            Teardown::Add => "add",
            Teardown::Remove => "remove",
        }
    }
}

fn registry_error(context: &str, err: redis::RedisError) -> VizorError {
    VizorError::registry(format!("{context}: {err}"))
}

/// [`SessionRegistry`] over a Redis server.
#[derive(Clone)]
pub struct RedisSessionRegistry {
    connection: ConnectionManager,
    append_layer: Script,
    set_field: Script,
}

impl RedisSessionRegistry {
    /// Connects to `url` (e.g. `redis://redis:6379/`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| registry_error("open client", e))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| registry_error("connect", e))?;
        tracing::info!(target: "vizor::registry", "[Registry] Connected to {}", url);
        Ok(Self {
            connection,
            append_layer: Script::new(APPEND_LAYER_SCRIPT),
            set_field: Script::new(SET_FIELD_SCRIPT),
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }

    async fn set_field(
        &self,
        context: &str,
        name: &SessionName,
        field: &str,
        value: &str,
        teardown: Teardown,
    ) -> Result<()> {
        let mut conn = self.conn();
        let _: i64 = self
            .set_field
            .key(name.as_str())
            .key(TEARDOWN_SET_KEY)
            .arg(field)
            .arg(value)
            .arg(teardown.as_arg())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| registry_error(context, e))?;
        Ok(())
    }
}

#[async_trait]
impl SessionRegistry for RedisSessionRegistry {
    async fn create_session(&self, name: &SessionName) -> Result<()> {
        let fields = record_schema::initial_fields()?;
        let mut conn = self.conn();
        let _: () = conn
            .hset_multiple(name.as_str(), fields.as_slice())
            .await
            .map_err(|e| registry_error("create session", e))?;
        Ok(())
    }

    async fn append_layer(
        &self,
        name: &SessionName,
        container_name: &str,
        display_name: &str,
        kind: LayerKind,
    ) -> Result<u32> {
        let mut conn = self.conn();
        let index: u32 = self
            .append_layer
            .key(name.as_str())
            .arg(record_schema::append_layer_args(container_name, display_name, kind))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| registry_error("append layer", e))?;
        Ok(index)
    }

    async fn set_viewer(&self, name: &SessionName, container_name: &str) -> Result<()> {
        self.set_field(
            "set viewer",
            name,
            VIEWER_CONTAINER_FIELD,
            container_name,
            Teardown::Keep,
        )
        .await
    }

    async fn get_session(&self, name: &SessionName) -> Result<Option<SessionRecord>> {
        let mut conn = self.conn();
        let fields: HashMap<String, String> = conn
            .hgetall(name.as_str())
            .await
            .map_err(|e| registry_error("get session", e))?;
        record_schema::decode_record(name, &fields)
    }

    async fn publish_viewer_token(&self, name: &SessionName, viewer: &ViewerInfo) -> Result<()> {
        let blob = record_schema::encode_viewer(viewer)?;
        self.set_field("publish viewer token", name, VIEWER_FIELD, &blob, Teardown::Keep)
            .await
    }

    async fn set_lifecycle(&self, name: &SessionName, lifecycle: Lifecycle) -> Result<()> {
        let encoded = record_schema::encode_lifecycle(lifecycle)?;
        let teardown = if lifecycle.is_reaping() {
            Teardown::Add
        } else {
            Teardown::Remove
        };
        self.set_field("set lifecycle", name, LIFECYCLE_FIELD, &encoded, teardown)
            .await
    }

    async fn delete_session(&self, name: &SessionName) -> Result<()> {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(name.as_str())
            .ignore()
            .srem(TEARDOWN_SET_KEY, name.as_str())
            .ignore();

        let mut conn = self.conn();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| registry_error("delete session", e))?;
        Ok(())
    }

    async fn sessions_in_teardown(&self) -> Result<Vec<SessionName>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn
            .smembers(TEARDOWN_SET_KEY)
            .await
            .map_err(|e| registry_error("list teardown set", e))?;

        let mut names: Vec<SessionName> = members
            .into_iter()
            .filter_map(|member| match SessionName::new(member) {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::warn!(target: "vizor::registry", "[Registry] Skipping teardown entry: {}", e);
                    None
                }
            })
            .collect();
        names.sort();
        Ok(names)
    }
}
