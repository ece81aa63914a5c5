use anyhow::Result;
use esp_idf_svc::sys::{
    esp, esp_chip_info, esp_chip_info_t, esp_chip_model_t,
    esp_chip_model_t_CHIP_ESP32, esp_chip_model_t_CHIP_ESP32C2,
    esp_chip_model_t_CHIP_ESP32C3, esp_chip_model_t_CHIP_ESP32C6,
    esp_chip_model_t_CHIP_ESP32H2, esp_chip_model_t_CHIP_ESP32S2,
    esp_chip_model_t_CHIP_ESP32S3, esp_flash_get_size,
    esp_get_minimum_free_heap_size, esp_pm_config_t, esp_pm_configure,
};
use log::{info, warn};

// Chip feature bits, as laid out in esp_chip_info.h.
const FEATURE_EMB_FLASH: u32 = 1 << 0;
const FEATURE_WIFI_BGN: u32 = 1 << 1;
const FEATURE_BLE: u32 = 1 << 4;
const FEATURE_BT: u32 = 1 << 5;
const FEATURE_IEEE802154: u32 = 1 << 6;

// Frequency bounds for the dynamic frequency scaling policy, in MHz.
const MAX_FREQ_MHZ: i32 = 240;
const MIN_FREQ_MHZ: i32 = 80;

fn model_name(model: esp_chip_model_t) -> &'static str {
    match model {
        esp_chip_model_t_CHIP_ESP32 => "esp32",
        esp_chip_model_t_CHIP_ESP32S2 => "esp32s2",
        esp_chip_model_t_CHIP_ESP32S3 => "esp32s3",
        esp_chip_model_t_CHIP_ESP32C2 => "esp32c2",
        esp_chip_model_t_CHIP_ESP32C3 => "esp32c3",
        esp_chip_model_t_CHIP_ESP32C6 => "esp32c6",
        esp_chip_model_t_CHIP_ESP32H2 => "esp32h2",
        _ => "unknown",
    }
}

fn feature_names(features: u32) -> Vec<&'static str> {
    let mut names = Vec::new();

    if features & FEATURE_WIFI_BGN != 0 {
        names.push("WiFi b/g/n");
    }
    if features & FEATURE_BT != 0 {
        names.push("BT");
    }
    if features & FEATURE_BLE != 0 {
        names.push("BLE");
    }
    if features & FEATURE_IEEE802154 != 0 {
        names.push("802.15.4");
    }

    names
}

/// Logs the hardware identity and capability report: chip model, core
/// count, feature set, silicon revision, flash size, and the minimum free
/// heap watermark.
///
/// # Returns
/// `Ok(())` on success.
///
/// # Errors
/// Returns an error if the flash size cannot be queried.
pub fn report() -> Result<()> {
    let mut chip = esp_chip_info_t::default();
    unsafe { esp_chip_info(&mut chip) };

    info!(
        "Chip: {} with {} CPU core(s), features: {}",
        model_name(chip.model),
        chip.cores,
        feature_names(chip.features).join("/")
    );
    info!(
        "Silicon revision: v{}.{}",
        chip.revision / 100,
        chip.revision % 100
    );

    let mut flash_size = 0_u32;
    esp!(unsafe { esp_flash_get_size(std::ptr::null_mut(), &mut flash_size) })?;
    info!(
        "Flash: {} MB, {}",
        flash_size / (1024 * 1024),
        if chip.features & FEATURE_EMB_FLASH != 0 {
            "embedded"
        } else {
            "external"
        }
    );

    info!("Minimum free heap size: {} bytes", unsafe {
        esp_get_minimum_free_heap_size()
    });

    Ok(())
}

/// Applies the static dynamic-frequency-scaling policy (240 MHz max,
/// 80 MHz min, light sleep off) and logs the configured bounds.
///
/// A rejection from the power management layer is logged but not treated
/// as fatal, since the policy only takes effect on builds with power
/// management compiled in.
pub fn configure_power() {
    let config = esp_pm_config_t {
        max_freq_mhz: MAX_FREQ_MHZ,
        min_freq_mhz: MIN_FREQ_MHZ,
        light_sleep_enable: false,
    };

    match esp!(unsafe { esp_pm_configure(std::ptr::addr_of!(config).cast()) }) {
        Ok(()) => info!(
            "CPU max freq: {} MHz, min freq: {} MHz, light sleep: off",
            MAX_FREQ_MHZ, MIN_FREQ_MHZ
        ),
        Err(e) => warn!("Power management configuration rejected: {}", e),
    }
}
