use anyhow::{anyhow, Result};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::{
    eventloop::{EspSubscription, EspSystemEventLoop, System},
    ipv4::IpInfo,
    netif::IpEvent,
    nvs::EspDefaultNvsPartition,
    sys::{esp, esp_wifi_connect},
    wifi::{EspWifi, WifiEvent},
};
use log::{error, info};
use std::sync::{Arc, Condvar, Mutex};

/// Maximum number of reconnection attempts before the connection is reported
/// as failed.
pub const RETRY_LIMIT: u32 = 5;

/// Wi-Fi network configuration containing SSID, password, and authentication method.
///
/// # Fields
/// * `ssid` - The network SSID.
/// * `password` - The network password.
/// * `auth` - The minimum accepted authentication method (e.g., `WPA2Personal`).
pub struct Config {
    ssid: &'static str,
    password: &'static str,
    auth: AuthMethod,
}

impl Config {
    fn new(ssid: &'static str, password: &'static str, auth: AuthMethod) -> Self {
        Self {
            ssid,
            password,
            auth,
        }
    }

    /// Returns the configured Wi-Fi SSID.
    ///
    /// # Returns
    /// The SSID as a string slice.
    #[must_use]
    pub fn ssid(&self) -> &str {
        self.ssid
    }

    /// Returns the configured Wi-Fi password.
    ///
    /// # Returns
    /// The password as a string slice.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password
    }

    /// Returns the minimum accepted authentication method.
    ///
    /// # Returns
    /// The [`AuthMethod`] variant for this configuration.
    #[must_use]
    pub fn auth(&self) -> AuthMethod {
        self.auth
    }

    /// Creates a `Config` from compile-time environment variables.
    ///
    /// Reads `WIFI_SSID` and `WIFI_PASSWORD` via `option_env!` and defaults
    /// to `WPA2Personal` as the weakest acceptable authentication mode.
    ///
    /// # Returns
    /// A `Config` populated from environment variables.
    ///
    /// # Errors
    /// Returns an error if `WIFI_SSID` or `WIFI_PASSWORD` is not set at compile time.
    pub fn from_env() -> Result<Self> {
        let ssid = option_env!("WIFI_SSID")
            .ok_or_else(|| anyhow!("WIFI_SSID environment variable not set"))?;
        let password = option_env!("WIFI_PASSWORD")
            .ok_or_else(|| anyhow!("WIFI_PASSWORD environment variable not set"))?;

        Ok(Self::new(ssid, password, AuthMethod::WPA2Personal))
    }
}

/// Terminal result of a supervised connection attempt.
///
/// # Variants
/// * `Connected` - The station associated with the access point and acquired an address.
/// * `Failed` - The retry budget was exhausted without acquiring an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Connected,
    Failed,
}

// Connectivity notifications, abstracted from the vendor event types so the
// retry logic stays hardware-independent.
#[derive(Clone, Copy, Debug)]
enum StationEvent {
    Started,
    Disconnected,
    IpAcquired,
}

// What the event handler should do after a notification has been recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Connect,
    Hold,
}

/// Retry bookkeeping for the connection: a bounded counter and the terminal
/// outcome, mutated exclusively by the event callbacks.
struct Progress {
    retries: u32,
    limit: u32,
    outcome: Option<Outcome>,
}

impl Progress {
    fn new(limit: u32) -> Self {
        Self {
            retries: 0,
            limit,
            outcome: None,
        }
    }

    /// Records a connectivity notification and decides the next step.
    ///
    /// # Arguments
    /// * `event` - The notification delivered by the event loop.
    ///
    /// # Returns
    /// `Step::Connect` if a (re)connection attempt should be issued,
    /// `Step::Hold` otherwise.
    fn observe(&mut self, event: StationEvent) -> Step {
        match event {
            StationEvent::Started => Step::Connect,
            StationEvent::Disconnected => self.disconnected(),
            StationEvent::IpAcquired => {
                self.retries = 0;
                self.outcome = Some(Outcome::Connected);
                Step::Hold
            }
        }
    }

    fn disconnected(&mut self) -> Step {
        if self.outcome == Some(Outcome::Failed) {
            // Terminal: no further attempts once the budget is exhausted.
            return Step::Hold;
        }

        if self.retries < self.limit {
            self.retries += 1;
            info!(
                "Retrying connection to the AP ({}/{})",
                self.retries, self.limit
            );
            Step::Connect
        } else {
            error!("Connection to the AP failed after {} retries", self.limit);
            self.outcome = Some(Outcome::Failed);
            Step::Hold
        }
    }
}

/// Synchronizes the event callbacks with the context blocked on the
/// connection outcome.
///
/// The callbacks are the only writers; the waiter only blocks until a
/// terminal outcome is recorded, so the mutex/condvar pair is the single
/// synchronization point.
struct Monitor {
    progress: Mutex<Progress>,
    done: Condvar,
}

impl Monitor {
    fn new(limit: u32) -> Self {
        Self {
            progress: Mutex::new(Progress::new(limit)),
            done: Condvar::new(),
        }
    }

    /// Records a notification and wakes the waiter if a terminal outcome
    /// was reached.
    ///
    /// # Errors
    /// Returns an error if the progress record cannot be locked.
    fn observe(&self, event: StationEvent) -> Result<Step> {
        let mut progress = self
            .progress
            .lock()
            .map_err(|e| anyhow!("Mutex lock error: {:?}", e))?;

        let step = progress.observe(event);
        if progress.outcome.is_some() {
            self.done.notify_all();
        }

        Ok(step)
    }

    /// Blocks until a terminal outcome is recorded, with no timeout.
    ///
    /// # Errors
    /// Returns an error if the progress record cannot be locked.
    fn wait(&self) -> Result<Outcome> {
        let mut progress = self
            .progress
            .lock()
            .map_err(|e| anyhow!("Mutex lock error: {:?}", e))?;

        loop {
            if let Some(outcome) = progress.outcome {
                return Ok(outcome);
            }

            progress = self
                .done
                .wait(progress)
                .map_err(|e| anyhow!("Condvar wait error: {:?}", e))?;
        }
    }
}

// Runs in callback context, which cannot propagate errors: log and carry on.
fn dispatch(monitor: &Monitor, event: StationEvent) {
    match monitor.observe(event) {
        Ok(Step::Connect) => {
            if let Err(e) = esp!(unsafe { esp_wifi_connect() }) {
                error!("Connect request failed: {}", e);
            }
        }
        Ok(Step::Hold) => (),
        Err(e) => error!("Failed to handle {:?}: {:#}", event, e),
    }
}

/// Represents a supervised Wi-Fi station connection.
///
/// Owns the ESP-IDF Wi-Fi driver and the event-loop subscriptions feeding
/// the retry state machine. Connection attempts are issued from the event
/// callbacks; the caller blocks on [`Connection::await_connection`] until a
/// terminal outcome is reached.
pub struct Connection<'a> {
    wifi: EspWifi<'a>,
    monitor: Arc<Monitor>,
    _wifi_events: EspSubscription<'static, System>,
    _ip_events: EspSubscription<'static, System>,
}

impl Connection<'_> {
    /// Configures and starts the Wi-Fi driver in station mode.
    ///
    /// Registers callbacks for station and IP events on the system event
    /// loop before starting the driver, so the start notification itself
    /// triggers the first connection attempt.
    ///
    /// # Arguments
    /// * `modem` - The modem peripheral.
    /// * `sysloop` - The system event loop delivering connectivity notifications.
    /// * `nvs` - The default NVS partition used by the driver for calibration data.
    /// * `config` - The Wi-Fi configuration containing SSID, password, and authentication method.
    ///
    /// # Returns
    /// A `Connection` whose outcome can be awaited.
    ///
    /// # Errors
    /// Returns an error if the driver cannot be created or configured,
    /// SSID/password conversion fails, or the callbacks cannot be registered.
    pub fn start(
        modem: Modem,
        sysloop: &EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        config: &Config,
    ) -> Result<Self> {
        let mut wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;

        let configuration: Configuration =
            Configuration::Client(ClientConfiguration {
                auth_method: config.auth(),
                ssid: config
                    .ssid()
                    .try_into()
                    .map_err(|()| anyhow!("Failed to convert SSID"))?,
                password: config
                    .password()
                    .try_into()
                    .map_err(|()| anyhow!("Failed to convert password"))?,
                ..Default::default()
            });
        wifi.set_configuration(&configuration)?;

        let monitor = Arc::new(Monitor::new(RETRY_LIMIT));

        let wifi_events = {
            let monitor = Arc::clone(&monitor);
            sysloop.subscribe::<WifiEvent, _>(move |event| match event {
                WifiEvent::StaStarted => {
                    dispatch(&monitor, StationEvent::Started);
                }
                WifiEvent::StaDisconnected(_) => {
                    dispatch(&monitor, StationEvent::Disconnected);
                }
                _ => (),
            })?
        };

        let ip_events = {
            let monitor = Arc::clone(&monitor);
            sysloop.subscribe::<IpEvent, _>(move |event| {
                if let IpEvent::DhcpIpAssigned(_) = event {
                    dispatch(&monitor, StationEvent::IpAcquired);
                }
            })?
        };

        wifi.start()?;
        info!("Station started, connecting to SSID: {}", config.ssid());

        Ok(Self {
            wifi,
            monitor,
            _wifi_events: wifi_events,
            _ip_events: ip_events,
        })
    }

    /// Blocks the calling context until the connection either succeeds or
    /// exhausts its retry budget. There is no timeout.
    ///
    /// # Returns
    /// The terminal [`Outcome`] of the connection.
    ///
    /// # Errors
    /// Returns an error if the shared connection state is poisoned.
    pub fn await_connection(&self) -> Result<Outcome> {
        self.monitor.wait()
    }

    /// Checks if the Wi-Fi connection is currently on.
    ///
    /// # Returns
    ///
    /// `true` if the connection is on, `false` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if checking the state fails.
    pub fn is_on(&self) -> Result<bool> {
        Ok(self.wifi.is_connected()?)
    }

    /// Returns the IP settings acquired by the station network interface.
    ///
    /// # Returns
    /// The [`IpInfo`] of the station interface.
    ///
    /// # Errors
    /// Returns an error if the interface information cannot be queried.
    pub fn ip_info(&self) -> Result<IpInfo> {
        Ok(self.wifi.sta_netif().get_ip_info()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{thread, time::Duration};

    #[test]
    fn start_notification_issues_connect() {
        let mut progress = Progress::new(RETRY_LIMIT);

        assert_eq!(progress.observe(StationEvent::Started), Step::Connect);
        assert_eq!(progress.retries, 0);
        assert_eq!(progress.outcome, None);
    }

    #[test]
    fn first_disconnect_retries() {
        let mut progress = Progress::new(RETRY_LIMIT);
        progress.observe(StationEvent::Started);

        assert_eq!(progress.observe(StationEvent::Disconnected), Step::Connect);
        assert_eq!(progress.retries, 1);
        assert_eq!(progress.outcome, None);
    }

    #[test]
    fn exhausted_retries_fail_terminally() {
        let mut progress = Progress::new(RETRY_LIMIT);
        progress.observe(StationEvent::Started);

        for attempt in 1..=RETRY_LIMIT {
            assert_eq!(
                progress.observe(StationEvent::Disconnected),
                Step::Connect
            );
            assert_eq!(progress.retries, attempt);
        }

        assert_eq!(progress.observe(StationEvent::Disconnected), Step::Hold);
        assert_eq!(progress.outcome, Some(Outcome::Failed));

        // No further attempts once failed.
        assert_eq!(progress.observe(StationEvent::Disconnected), Step::Hold);
        assert_eq!(progress.outcome, Some(Outcome::Failed));
    }

    #[test]
    fn address_acquired_resets_counter() {
        let mut progress = Progress::new(RETRY_LIMIT);
        progress.observe(StationEvent::Started);
        for _ in 0..3 {
            progress.observe(StationEvent::Disconnected);
        }

        assert_eq!(progress.observe(StationEvent::IpAcquired), Step::Hold);
        assert_eq!(progress.outcome, Some(Outcome::Connected));
        assert_eq!(progress.retries, 0);
    }

    #[test]
    fn wait_blocks_until_terminal() {
        let monitor = Arc::new(Monitor::new(RETRY_LIMIT));

        let waiter = {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || monitor.wait().unwrap())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        monitor.observe(StationEvent::IpAcquired).unwrap();
        assert_eq!(waiter.join().unwrap(), Outcome::Connected);
    }

    #[test]
    fn wait_observes_failure() {
        let monitor = Monitor::new(0);

        assert_eq!(
            monitor.observe(StationEvent::Disconnected).unwrap(),
            Step::Hold
        );
        assert_eq!(monitor.wait().unwrap(), Outcome::Failed);
    }
}
