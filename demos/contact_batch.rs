use std::sync::Arc;

use formpilot::{BatchRunner, ChromeBrowser, FillConfig, JsonlRecorder, ProfileData};

/// Usage: contact_batch <profile.json> <results.jsonl> <url>...
#[tokio::main]
async fn main() -> formpilot::Result<()> {
    let mut args = std::env::args().skip(1);
    let (Some(profile_path), Some(results_path)) = (args.next(), args.next()) else {
        eprintln!("usage: contact_batch <profile.json> <results.jsonl> <url>...");
        return Ok(());
    };
    let urls: Vec<String> = args.collect();

    let profile = ProfileData::from_json(&tokio::fs::read_to_string(&profile_path).await?)?;
    let recorder = Arc::new(JsonlRecorder::open(&results_path).await?);
    let browser = Arc::new(ChromeBrowser::builder().headless(true).build().await?);

    let runner = BatchRunner::new(FillConfig::default(), profile, browser.clone(), recorder);
    let report = runner.run(urls).await?;
    print!("{report}");
    println!("results written to {results_path}");

    drop(runner);
    if let Ok(browser) = Arc::try_unwrap(browser) {
        browser.close().await?;
    }
    Ok(())
}
