use anyhow::{Context, Result};
use mediclear::{
    AnalysisResult, AnalysisSession, DocumentPayload, InMemoryAnalysisStore, MediClearConfig,
    ReportPipeline,
};
use std::env;
use std::sync::Arc;

fn print_result(result: &AnalysisResult) {
    println!("Summary:");
    println!("────────");
    println!("{}", result.summary);
    println!();
    println!(
        "Type: {}   Urgency: {}",
        result.document_type.as_str(),
        result.urgency_level.as_str()
    );

    if !result.metrics.is_empty() {
        println!();
        println!("Metrics:");
        for metric in &result.metrics {
            println!(
                "  {:<24} {:>10} {:<8} ({:?}, normal {})",
                metric.name, metric.value, metric.unit, metric.status, metric.normal_range
            );
        }
    }

    for item in &result.action_items {
        println!("  - {}", item);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("MediClear report analysis");
    println!("=========================");

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <report_file> [language]", args[0]);
        eprintln!("Example: {} ./blood_test.jpg as", args[0]);
        std::process::exit(1);
    }

    let config = MediClearConfig::from_env();
    if !config.api_key_configured() {
        eprintln!("Please set GEMINI_API_KEY environment variable");
        eprintln!("Example: export GEMINI_API_KEY='your_key_here'");
        std::process::exit(1);
    }

    let document = DocumentPayload::from_path(&args[1])
        .await
        .with_context(|| format!("reading {}", args[1]))?;
    println!("Processing {} ({})", args[1], document.mime_type());
    println!();

    let pipeline = ReportPipeline::from_config(&config, Arc::new(InMemoryAnalysisStore::new()))?
        .with_prefetch_language(None);
    let session = Arc::new(AnalysisSession::new("cli"));

    let outcome = pipeline.analyze(&session, None, &document).await?;
    print_result(&outcome.result);

    if let Some(language) = args.get(2) {
        println!();
        println!("Translating to {}...", language);
        let translated = pipeline.select_language(&session, language).await?;
        println!();
        print_result(&translated);
    }

    Ok(())
}
