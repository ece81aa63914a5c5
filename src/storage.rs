use anyhow::Result;
use esp_idf_svc::{
    nvs::EspDefaultNvsPartition,
    sys::{
        esp, nvs_flash_erase, EspError, ESP_ERR_NVS_NEW_VERSION_FOUND,
        ESP_ERR_NVS_NO_FREE_PAGES,
    },
};
use log::warn;

// The stored format is unusable: either the partition is out of free pages
// or it was written by a different NVS version.
fn incompatible(e: EspError) -> bool {
    e.code() == ESP_ERR_NVS_NO_FREE_PAGES
        || e.code() == ESP_ERR_NVS_NEW_VERSION_FOUND
}

/// Initializes the default non-volatile storage partition.
///
/// If the partition reports an incompatible or exhausted format, it is
/// erased and initialized again. Any other failure is fatal.
///
/// # Returns
/// The initialized default NVS partition.
///
/// # Errors
/// Returns an error if the partition cannot be initialized, or cannot be
/// erased and re-initialized after an incompatibility was detected.
pub fn init() -> Result<EspDefaultNvsPartition> {
    match EspDefaultNvsPartition::take() {
        Ok(partition) => Ok(partition),
        Err(e) if incompatible(e) => {
            warn!("NVS partition is stale or full, erasing it: {}", e);
            esp!(unsafe { nvs_flash_erase() })?;
            Ok(EspDefaultNvsPartition::take()?)
        }
        Err(e) => Err(e.into()),
    }
}
