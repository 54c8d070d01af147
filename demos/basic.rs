use qbitlink::{discover_devices, Config, Dispatcher, LineTransport, MockProvider, SerialTransport};

fn main() -> Result<(), qbitlink::QbitLinkError> {
    // List connected candidates
    let devices = discover_devices();
    for dev in &devices {
        println!(
            "Found: {} — {}",
            dev.port,
            dev.product.as_deref().unwrap_or("unknown product")
        );
    }

    // Answer a few requests the way the microcontroller would send them
    let config = Config::default();
    let mut dispatcher = Dispatcher::new(&config, MockProvider::default());
    for line in [
        r#"{"action": "start_job", "num_qubits": 4}"#,
        r#"{"action": "configure_ibm", "token": "abc"}"#,
        r#"{"action": "get_job_status", "job_id": "unknown"}"#,
        r#"{"action": "ping"}"#,
        "not json",
    ] {
        match dispatcher.handle_line(line) {
            Some(response) => println!("{line}\n  -> {}", qbitlink::protocol::to_spaced_json(&response)?),
            None => println!("{line}\n  -> (no response)"),
        }
    }

    // Send one sampled bit to the first device, if there is one
    if let Some(dev) = devices.first() {
        let mut transport = SerialTransport::open(&dev.port, config.baud_rate, config.settle_delay)?;
        if let Some(response) = dispatcher.handle_line(r#"{"action": "start_job"}"#) {
            dispatcher.respond(&mut transport, &response)?;
        }
        std::thread::sleep(std::time::Duration::from_millis(500));
        if let Some(reply) = transport.read_line()? {
            println!("\nDevice replied: {reply}");
        }
    }

    Ok(())
}
