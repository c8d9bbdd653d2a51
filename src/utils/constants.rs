pub const ENV_PREFIX: &str = "ENTITLED";

pub const VERIFY_PATH: &str = "/api/entitlements";

/// Key under which the client keeps its last verified decision.
pub const CACHE_KEY: &str = "entitled:decision";

pub const DEFAULT_CACHE_TTL_MS: u64 = 10 * 60 * 1000;
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30 * 60 * 1000;

pub const BASE_BACKOFF_MS: u64 = 1_000;
pub const MAX_RETRIES: u32 = 3;

pub const LOADING_DEBOUNCE_MS: u64 = 2_000;
pub const REDIRECT_COUNTDOWN_MS: u64 = 1_500;

pub const MSG_EXPIRED: &str = "expired";
pub const MSG_NO_ENTITLEMENT: &str = "no active entitlement";
pub const MSG_PENDING_VALIDATION: &str = "awaiting approval";

/// Query parameters that mark a return from the checkout flow.
pub const PAYMENT_RETURN_PARAMS: &[(&str, &str)] = &[
    ("payment", "success"),
    ("payment", "completed"),
    ("checkout", "success"),
];

pub const MIGRATIONS_PATH: &str = "src/db/migrations";
