pub fn main() -> beacon::Result<()> {
    // Configure env_logger to see Beacon SDK logs.
    env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("beacon")).init();

    let sdk_key =
        std::env::var("BEACON_SDK_KEY").expect("BEACON_SDK_KEY env variable should contain SDK key");
    let client = beacon::ClientConfig::from_sdk_key(sdk_key)
        .project("acct-demo", "proj-demo")
        .delivery_callback(beacon::FnCallback::new(
            |record: &beacon::EventRecord| {
                println!("Delivered {} visitor(s)", record.visitors.len());
            },
            |_: &beacon::EventRecord, err: &beacon::Error| {
                eprintln!("Delivery failed: {:?}", err);
            },
        ))
        .to_client()?;

    for visitor in ["alice", "bob", "carol"] {
        client.track(
            beacon::TrackEvent::new(visitor, "example-event").with_tag("source", "simple-example"),
        );
    }

    // Flush and wait for delivery before exiting.
    client.flush();
    if !client.shutdown(std::time::Duration::from_secs(5)) {
        eprintln!("Shutdown timed out with events still in flight");
    }

    Ok(())
}
