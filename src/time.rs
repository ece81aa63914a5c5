use esp_idf_hal::delay::FreeRtos;

/// Suspends the calling task for the given duration.
///
/// # Arguments
/// * `ms` - The delay in milliseconds.
pub fn sleep(ms: u32) {
    FreeRtos::delay_ms(ms);
}
