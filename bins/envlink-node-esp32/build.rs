//! Build script for the envlink ESP32 firmware
//!
//! Sets up the ESP-IDF environment variables needed for compilation and
//! rebuilds when the baked-in credentials change.

fn main() {
    // Output ESP-IDF environment configuration
    embuild::espidf::sysenv::output();

    for var in [
        "WIFI_SSID",
        "WIFI_PASSWORD",
        "MQTT_HOST",
        "MQTT_PORT",
        "MQTT_ACCESS_TOKEN",
        "DEVICE_NAME",
    ] {
        println!("cargo:rerun-if-env-changed={var}");
    }
}
