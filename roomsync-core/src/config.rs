/// Tunables enumerated by spec §6.3. Every field has the spec's default,
/// and the server crate is the only place these are ever overridden from
/// the environment (see `roomsync-server`'s `Config::from_env`-style setup).
#[derive(Debug, Clone)]
pub struct Config {
    /// Floor of the sync buffer, in milliseconds.
    pub default_buffer_ms: u64,
    /// Cap of the sync buffer, in milliseconds.
    pub max_buffer_ms: u64,
    /// Multiplier applied to a room's max observed RTT to size the sync buffer.
    pub rtt_multiplier: u64,
    /// Cadence of the periodic `playback:sync` broadcast, in milliseconds.
    pub sync_tick_ms: u64,
    /// Lifetime of a vote session before it self-expires, in seconds.
    pub vote_ttl_s: u64,
    /// Lifetime of a vote session's result record after it completes, in seconds.
    pub vote_complete_ttl_s: u64,
    /// Per-room cooldown after a mutiny starts, in seconds.
    pub mutiny_cooldown_s: u64,
    /// Fallback per-user DJ cooldown after removal-by-mutiny, in minutes,
    /// used only if a room's own setting doesn't specify one.
    pub dj_cooldown_min: u64,
    /// Fraction of eligible voters required for a mutiny to pass, used only
    /// if a room's own setting doesn't specify one.
    pub mutiny_threshold: f64,
    /// Per-connection ephemeral record expiry, in seconds.
    pub connection_ttl_s: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_buffer_ms: 100,
            max_buffer_ms: 500,
            rtt_multiplier: 2,
            sync_tick_ms: 10_000,
            vote_ttl_s: 300,
            vote_complete_ttl_s: 60,
            mutiny_cooldown_s: 600,
            dj_cooldown_min: 15,
            mutiny_threshold: 0.51,
            connection_ttl_s: 300,
        }
    }
}

impl Config {
    /// Clamps a raw max-room-RTT reading to the published sync buffer (§I4, §4.3).
    pub fn sync_buffer_ms(&self, max_room_rtt_ms: u64) -> u64 {
        (max_room_rtt_ms.saturating_mul(self.rtt_multiplier))
            .clamp(self.default_buffer_ms, self.max_buffer_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_clamps_to_floor_below_default() {
        let config = Config::default();
        assert_eq!(config.sync_buffer_ms(10), 100, "rtt=10ms*2=20 should clamp up to the 100ms floor");
    }

    #[test]
    fn buffer_scales_within_range() {
        let config = Config::default();
        assert_eq!(config.sync_buffer_ms(150), 300, "rtt=150ms*2=300 is within [100,500]");
    }

    #[test]
    fn buffer_clamps_to_cap_above_max() {
        let config = Config::default();
        assert_eq!(config.sync_buffer_ms(500), 500, "rtt=500ms*2=1000 should clamp down to the 500ms cap");
    }
}
