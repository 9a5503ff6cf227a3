//! `opsclaw serve`: start the scheduler and HTTP task API.

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config()?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🦀 OpsClaw Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {} ({})", config.provider.model, config.provider.endpoint);
    println!(
        "   Workers:   {} (queue capacity {})",
        config.scheduler.worker_pool_size, config.scheduler.queue_capacity
    );
    println!("   Task log:  {}", config.task_log.dir.display());

    opsclaw_gateway::start(config).await?;

    Ok(())
}
