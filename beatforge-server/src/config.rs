use std::net::SocketAddr;

/// Server bind address plus an optional default calibration profile path,
/// read from the environment the way the teacher reads its bind port —
/// no config file parser is warranted at this scale.
pub struct Config {
    pub bind_addr: SocketAddr,
    pub default_calibration_profile_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("BEATFORGE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8766);
        let bind_addr = SocketAddr::from(([127, 0, 0, 1], port));
        let default_calibration_profile_path = std::env::var("BEATFORGE_CALIBRATION_PROFILE").ok();

        Self { bind_addr, default_calibration_profile_path }
    }
}
