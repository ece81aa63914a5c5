use anyhow::bail;
use esp_idf_hal::prelude::Peripherals;
use esp_idf_svc::{eventloop::EspSystemEventLoop, log::EspLogger};
use log::info;

use esp_station::{
    board,
    http::{Client, PROBE_URL},
    storage, thread, time,
    wifi::{Config, Connection, Outcome},
};

fn main() -> ! {
    thread::main(|| {
        // It is necessary to call this function once. Otherwise some patches to the runtime
        // implemented by esp-idf-sys might not link properly. See https://github.com/esp-rs/esp-idf-template/issues/71
        esp_idf_hal::sys::link_patches();

        EspLogger::initialize_default();

        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs = storage::init()?;

        board::report()?;
        board::configure_power();

        let config = Config::from_env()?;
        let connection =
            Connection::start(peripherals.modem, &sysloop, nvs, &config)?;

        match connection.await_connection()? {
            Outcome::Connected => info!(
                "Connected to AP SSID: {}, ip: {}",
                config.ssid(),
                connection.ip_info()?.ip
            ),
            Outcome::Failed => {
                bail!("Failed to connect to SSID: {}", config.ssid())
            }
        }

        // DHCP just completed; give the link a moment before probing.
        time::sleep(500);

        let mut client = Client::new(connection)?;
        let status = client.get(PROBE_URL)?;
        info!("HTTP probe succeeded with status {}", status);

        // The probe is one-shot; idle from here on.
        loop {
            time::sleep(60_000);
        }
    })
}
