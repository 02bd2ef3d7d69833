//! Server-side Lua scripts.
//!
//! Each script runs atomically on the server, so concurrent relays updating
//! the same user never interleave.

/// `KEYS[1]` user key, `ARGV[1]` upload delta, `ARGV[2]` download delta.
///
/// Increments only if the key exists; returns 1 if applied, 0 otherwise.
pub const ADD_TRAFFIC: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HINCRBY', KEYS[1], 'upload', ARGV[1])
redis.call('HINCRBY', KEYS[1], 'download', ARGV[2])
return 1
";

/// `KEYS[1]` user key.
///
/// Returns `{upload, download}` and zeroes both fields of an existing key.
pub const GET_AND_RESET: &str = r"
local values = redis.call('HMGET', KEYS[1], 'upload', 'download')
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('HSET', KEYS[1], 'upload', 0, 'download', 0)
end
return {tonumber(values[1]) or 0, tonumber(values[2]) or 0}
";
