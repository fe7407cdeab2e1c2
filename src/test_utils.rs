/*
 * Test utilities for Thermoreg
 *
 * Builders for fake sysfs trees (1-Wire devices, PWM chips) so the hardware
 * collaborators can be exercised against a temporary directory.
 */

use std::fs;
use std::path::Path;

use tempfile::TempDir;

/// A w1_slave record for 23.125 °C with a good CRC
pub const VALID_RECORD: &str =
    "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t=23125\n";

/// Overwrite the w1_slave record in `device_dir`
pub fn write_w1_record(device_dir: &Path, crc_ok: bool, millidegrees: i32) {
    let status = if crc_ok { "YES" } else { "NO" };
    let record = format!(
        "72 01 4b 46 7f ff 0e 10 57 : crc=57 {}\n72 01 4b 46 7f ff 0e 10 57 t={}\n",
        status, millidegrees
    );
    fs::write(device_dir.join("w1_slave"), record).unwrap();
}

/// Creates a fake `/sys/bus/w1/devices` with one directory per name.
/// DS18B20 entries (`28-*`) get a valid record.
pub fn fake_w1_tree(names: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for name in names {
        let device = dir.path().join(name);
        fs::create_dir_all(&device).unwrap();
        if name.starts_with("28") {
            fs::write(device.join("w1_slave"), VALID_RECORD).unwrap();
        }
    }
    dir
}

/// Creates a fake `/sys/class/pwm` with `pwmchip<chip>`.
/// With `exported`, the channel directory already exists as the kernel would
/// leave it after a write to `export`.
pub fn fake_pwm_tree(chip: u32, channel: u32, exported: bool) -> TempDir {
    let dir = TempDir::new().unwrap();
    let chip_dir = dir.path().join(format!("pwmchip{}", chip));
    fs::create_dir_all(&chip_dir).unwrap();
    fs::write(chip_dir.join("export"), "").unwrap();
    fs::write(chip_dir.join("unexport"), "").unwrap();
    fs::write(chip_dir.join("npwm"), "2\n").unwrap();
    if exported {
        let channel_dir = chip_dir.join(format!("pwm{}", channel));
        fs::create_dir_all(&channel_dir).unwrap();
        for attr in ["period", "duty_cycle", "enable"] {
            fs::write(channel_dir.join(attr), "0\n").unwrap();
        }
    }
    dir
}

/// Read a trimmed sysfs attribute
pub fn read_attr(path: &Path) -> String {
    fs::read_to_string(path).unwrap().trim().to_string()
}
