//! `opsclaw doctor`: diagnose config and endpoint health.

use opsclaw_config::AppConfig;
use opsclaw_core::provider::Provider;
use opsclaw_core::retriever::ContextRetriever;
use opsclaw_providers::OpenAiCompatProvider;
use opsclaw_tasklog::FileTaskLog;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 OpsClaw Doctor: System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults (run `opsclaw onboard`)");
        issues += 1;
    }
    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config before running further checks.");
            return Ok(());
        }
    };

    match OpenAiCompatProvider::from_config(&config.provider) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Model endpoint reachable ({})", config.provider.endpoint),
            Ok(false) => {
                println!("  ❌ Model endpoint answered with an error ({})", config.provider.endpoint);
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Model endpoint unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Model client could not be built: {e}");
            issues += 1;
        }
    }

    if config.retrieval.enabled {
        match opsclaw_providers::HttpRetriever::from_config(&config.retrieval) {
            Ok(retriever) => match retriever.health_check().await {
                Ok(true) => println!("  ✅ Retrieval endpoint reachable ({})", config.retrieval.endpoint),
                Ok(false) | Err(_) => {
                    println!(
                        "  ⚠️  Retrieval endpoint unavailable ({}); tasks run without context",
                        config.retrieval.endpoint
                    );
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  ❌ Retrieval client could not be built: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ✅ Retrieval disabled");
    }

    match FileTaskLog::open(&config.task_log.dir).await {
        Ok(log) => println!("  ✅ Task log writable ({})", log.dir().display()),
        Err(e) => {
            println!("  ❌ Task log unusable: {e}");
            issues += 1;
        }
    }

    if config.tools.elevation_command.is_empty() {
        println!("  ⚠️  No elevation command: protected writes will fail");
        issues += 1;
    } else {
        println!("  ✅ Elevation via `{}`", config.tools.elevation_command.join(" "));
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
