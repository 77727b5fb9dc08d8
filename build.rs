fn main() {
    // ── Device name filter baked in at build time ─────────────────────────────
    //
    // `protocol::DEFAULT_NAME_FILTER` reads `ECG_DEVICE_NAME` through
    // `option_env!`, so a rebuild is needed whenever it changes.
    println!("cargo:rerun-if-env-changed=ECG_DEVICE_NAME");

    // ── macOS: embed Info.plist so CoreBluetooth grants Bluetooth access ──────
    //
    // CBCentralManager refuses to scan (state stays "unauthorised") unless the
    // running binary carries an Info.plist with NSBluetoothAlwaysUsageDescription.
    // A CLI tool has no bundle, so the plist goes into the
    //   __TEXT,__info_plist
    // section of the Mach-O binary via the linker `-sectcreate` flag.
    //
    // `CARGO_CFG_TARGET_OS` is the *target* OS, so cross-compiling from
    // Linux → macOS works too.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("macos") {
        let dir = std::env::var("CARGO_MANIFEST_DIR")
            .expect("CARGO_MANIFEST_DIR must be set by Cargo");

        let plist = format!("{dir}/Info.plist");

        println!("cargo:rustc-link-arg=-sectcreate");
        println!("cargo:rustc-link-arg=__TEXT");
        println!("cargo:rustc-link-arg=__info_plist");
        println!("cargo:rustc-link-arg={plist}");

        println!("cargo:rerun-if-changed=Info.plist");
    }
}
