use std::env;

use fugit::MillisDurationU32;
use inquire::Select;
use mmpsu_v2::{Mmpsu, PortConfig, RegisterValue, transport::SerialTransport};
use tracing_subscriber::EnvFilter;

// Configuration constants - adjust these for your setup
const SERIAL_TIMEOUT_MS: u32 = 300;
const OUTPUT_VOLTAGE_MV: i32 = 12_000; // 12V
const PHASE_CURRENT_LIMIT_MA: i32 = 5_000; // 5A per phase
const STABILIZATION_DELAY_MS: u64 = 1000;

fn main() {
    // Set RUST_LOG=mmpsu_v2=debug to see every packet on the wire.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        // List available serial ports
        let ports = serialport::available_ports().expect("Failed to enumerate serial ports");

        if ports.is_empty() {
            eprintln!("No serial ports found!");
            std::process::exit(1);
        }

        let port_names: Vec<String> = ports.iter().map(|p| p.port_name.clone()).collect();

        // Interactive selection
        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    println!("Using port: {}", port_name);

    let config =
        PortConfig::new(port_name).with_timeout(MillisDurationU32::millis(SERIAL_TIMEOUT_MS));
    let port = SerialTransport::open(&config).expect("Failed to open serial port");

    // Create a PSU object
    let psu = Mmpsu::new(port);

    if !psu.test_comms().expect("MMPSU did not respond") {
        eprintln!("MMPSU echo did not match, check the checksum setting.");
        std::process::exit(1);
    }
    println!("Comms OK");

    println!("\n--- All Fields ---");
    for (name, value) in psu.read_all_fields().unwrap() {
        println!("{name:>24}: {value}");
    }

    // Set output voltage and phase current limits in one transaction
    psu.write_fields([
        ("VOUT_SETPOINT", RegisterValue::Int32(OUTPUT_VOLTAGE_MV)),
        ("PHASE_A_CURRENT_LIMIT", RegisterValue::Int32(PHASE_CURRENT_LIMIT_MA)),
        ("PHASE_B_CURRENT_LIMIT", RegisterValue::Int32(PHASE_CURRENT_LIMIT_MA)),
    ])
    .unwrap();
    println!(
        "\nSet output voltage to {}V",
        OUTPUT_VOLTAGE_MV as f32 / 1000.0
    );

    // Enable the output
    psu.write_field("OUTPUT_ENABLED", true).unwrap();
    println!("Output enabled");

    // Wait for output to stabilize
    std::thread::sleep(std::time::Duration::from_millis(STABILIZATION_DELAY_MS));

    let measured = psu
        .read_fields(["VOUT_MEASURED", "PHASES_ENABLED", "SYSTEM_STATE"])
        .unwrap();
    if let Some(mv) = measured["VOUT_MEASURED"].as_i32() {
        println!("Measured output voltage: {:.3}V", mv as f32 / 1000.0);
    }
    println!("Phases enabled: {}", measured["PHASES_ENABLED"]);
    println!("System state: {}", measured["SYSTEM_STATE"]);

    println!(
        "\nLink errors: {} rx, {} reported by device",
        psu.take_rx_crc_error_count(),
        psu.take_device_crc_error_count()
    );
}
