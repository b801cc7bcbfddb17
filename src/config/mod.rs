mod settings;

pub use settings::{
    AuthConfig, AuthMode, BusBackend, BusConfig, EmitConfig, JwtConfig, OtelConfig, RedisConfig,
    ServerConfig, Settings, WebSocketConfig,
};
