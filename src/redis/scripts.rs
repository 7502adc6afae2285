//! Lua sources of the dispatcher procedures.
//!
//! A counter is a hash `{count, deadline}`. The key expires one second after
//! its deadline because the window is still live at `now == deadline`.

pub(crate) const RESET_SCRIPT: &str = r#"
    local route_key = KEYS[1]
    local global_key = KEYS[2]

    local route_deadline = tonumber(ARGV[1])
    local global_deadline = tonumber(ARGV[2])

    redis.call("HSET", route_key, "count", 1, "deadline", route_deadline)
    redis.call("EXPIREAT", route_key, route_deadline + 1)

    redis.call("HSET", global_key, "count", 1, "deadline", global_deadline)
    redis.call("EXPIREAT", global_key, global_deadline + 1)

    return {route_deadline, global_deadline}
"#;

pub(crate) const NORMAL_SCRIPT: &str = r#"
    local function hit(key, limit, candidate_deadline, now)
        local state = redis.call("HMGET", key, "count", "deadline")
        local count = tonumber(state[1])
        local deadline = tonumber(state[2])

        if count == nil or deadline == nil or now > deadline then
            count = 1
            deadline = candidate_deadline
            redis.call("HSET", key, "count", count, "deadline", deadline)
            redis.call("EXPIREAT", key, deadline + 1)
        else
            count = redis.call("HINCRBY", key, "count", 1)
        end

        if count > limit then
            return -1, deadline
        end

        return limit - count, deadline
    end

    local route_limit = tonumber(ARGV[1])
    local global_limit = tonumber(ARGV[2])
    local route_deadline = tonumber(ARGV[3])
    local global_deadline = tonumber(ARGV[4])
    local now = tonumber(ARGV[5])

    local route_remaining, route_effective_deadline = hit(KEYS[1], route_limit, route_deadline, now)
    local global_remaining, global_effective_deadline = hit(KEYS[2], global_limit, global_deadline, now)

    return {route_remaining, global_remaining, route_effective_deadline, global_effective_deadline}
"#;
