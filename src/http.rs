use anyhow::{ensure, Result};
use embedded_svc::{http::client::Client as HttpClient, io::Read};
use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
use log::info;

use crate::wifi::Connection;

/// URL probed once after the station connection is up.
pub const PROBE_URL: &str = "http://ifconfig.net/";

/// Represents an HTTP client that interacts with a server over Wi-Fi.
///
/// This struct provides methods to send HTTP requests, such as GET requests, using the ESP-IDF framework.
/// It owns an active Wi-Fi connection for the duration of its lifetime.
pub struct Client<'a> {
    client: HttpClient<EspHttpConnection>,
    wifi: Connection<'a>,
}

impl<'a> Client<'a> {
    /// Creates a new `Client` instance with the given Wi-Fi connection.
    ///
    /// # Arguments
    ///
    /// * `wifi` - An active Wi-Fi connection.
    ///
    /// # Returns
    ///
    /// A new `Client` ready to send HTTP requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(wifi: Connection<'a>) -> Result<Self> {
        let client =
            HttpClient::wrap(EspHttpConnection::new(&Configuration::default())?);
        Ok(Self { client, wifi })
    }

    /// Sends a GET request to the specified URL and drains the response body.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to send the GET request to.
    ///
    /// # Returns
    ///
    /// The HTTP status code of the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wi-Fi is not connected, the request fails, or the response status is not in the success range.
    pub fn get(&mut self, url: &str) -> Result<u16> {
        ensure!(self.wifi.is_on()?, "WIFI is off");

        let request = self.client.get(url)?;
        let mut response = request.submit()?;

        let status = response.status();
        ensure!(
            (200..300).contains(&status),
            "Request failed with status: {}",
            status
        );

        let mut chunk = [0_u8; 256];
        let mut total = 0;
        loop {
            let read = response.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            total += read;
        }

        info!("GET {} -> {} ({} bytes)", url, status, total);

        Ok(status)
    }
}
