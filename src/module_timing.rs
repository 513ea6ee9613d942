use embassy_time::Duration;

/// Default budget for a command exchange.
pub fn command_timeout() -> Duration {
    Duration::from_millis(1000)
}

/// `+CIPSTART` worst case; the module retries DNS and the TCP handshake
/// internally before giving up.
pub fn connect_timeout() -> Duration {
    Duration::from_secs(75)
}

/// `+CIPCLOSE` worst case.
pub fn close_timeout() -> Duration {
    Duration::from_secs(15)
}

/// GPRS attach/detach and PDP context activation (`+CGATT`, `+CGACT`,
/// `+CIPSHUT`).
pub fn attach_timeout() -> Duration {
    Duration::from_secs(60)
}

/// `+CFUN` power transitions.
pub fn functionality_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Time to wait for the module to boot after a commanded restart.
pub fn boot_time() -> Duration {
    Duration::from_millis(3000)
}

/// Low time of the reset line when waking the module from sleep.
pub fn reset_time() -> Duration {
    Duration::from_millis(100)
}
