//! Stream a WAV file to the realtime endpoint and print live events.
//!
//! Credentials come from the environment (or a `.env` file):
//! `CONVOSTREAM_HOST`, `CONVOSTREAM_API_KEY`, and optionally
//! `CONVOSTREAM_PATH` (a fresh session path is generated when unset).

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use uuid::Uuid;

use convostream::messages::{
    InsightResponse, MessageResponse, RecognitionResult, TopicResponse,
};
use convostream::{
    AccessConfig, EventHandler, MessageCallback, MessageRouter, Result as ClientResult, Speaker,
    StartRequest, StreamingClient,
};

#[derive(Parser, Debug)]
#[command(about = "Stream a WAV file and print live conversation events")]
struct Args {
    /// Path to a 16 kHz mono LINEAR16 WAV file
    wav: PathBuf,

    /// Speaker name attached to the session
    #[arg(long, default_value = "stream-demo")]
    speaker: String,

    /// Milliseconds of audio per frame
    #[arg(long, default_value_t = 100)]
    chunk_ms: u64,
}

struct Printer;

#[async_trait]
impl EventHandler for Printer {
    async fn on_recognition_result(&self, event: RecognitionResult) -> ClientResult<()> {
        if event.is_final {
            println!(">> {}", event.transcript());
        }
        Ok(())
    }

    async fn on_message_response(&self, event: MessageResponse) -> ClientResult<()> {
        for message in &event.messages {
            let who = message.from.name.as_deref().unwrap_or("unknown");
            println!("[{}] {}", who, message.payload.content);
        }
        Ok(())
    }

    async fn on_insight_response(&self, event: InsightResponse) -> ClientResult<()> {
        for insight in &event.insights {
            println!(
                "insight ({}, {:.0}%): {}",
                insight.kind,
                insight.confidence * 100.0,
                insight.payload.content
            );
        }
        Ok(())
    }

    async fn on_topic_response(&self, event: TopicResponse) -> ClientResult<()> {
        for topic in &event.topics {
            println!("topic: {}", topic.phrases);
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    dotenvy::dotenv().ok();
    let host = env::var("CONVOSTREAM_HOST").context("CONVOSTREAM_HOST not set")?;
    let api_key = env::var("CONVOSTREAM_API_KEY").context("CONVOSTREAM_API_KEY not set")?;
    let path = env::var("CONVOSTREAM_PATH")
        .unwrap_or_else(|_| format!("v1/realtime/insights/{}", Uuid::new_v4()));
    let access = AccessConfig::new(host, path, api_key);

    let router = Arc::new(MessageRouter::new(Arc::new(Printer)));
    let callback: Arc<dyn MessageCallback> = router.clone();
    let client = StreamingClient::new(access, Some(callback))?;

    client.connect().await?;
    let start = StartRequest::default()
        .insight_types(vec![
            "question".to_string(),
            "action_item".to_string(),
            "follow_up".to_string(),
        ])
        .speaker(Speaker {
            user_id: format!("{}@local", args.speaker),
            name: args.speaker.clone(),
        });
    client.write_json(&start).await?;

    tokio::select! {
        result = stream_wav(&client, &args) => result?,
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted, stopping"),
    }

    // Allow trailing events to arrive before shutting down.
    tokio::time::sleep(Duration::from_secs(3)).await;
    client.stop().await;
    println!("conversation id: {}", router.conversation_id());
    Ok(())
}

async fn stream_wav(client: &StreamingClient, args: &Args) -> anyhow::Result<()> {
    let mut reader = hound::WavReader::open(&args.wav)
        .with_context(|| format!("failed to open {}", args.wav.display()))?;
    let spec = reader.spec();
    anyhow::ensure!(spec.channels == 1, "expected mono audio, got {} channels", spec.channels);
    anyhow::ensure!(
        spec.sample_format == hound::SampleFormat::Int && spec.bits_per_sample == 16,
        "expected 16-bit LINEAR16 samples"
    );

    let samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<_, _>>()?;
    let samples_per_chunk = (spec.sample_rate as u64 * args.chunk_ms / 1000) as usize;
    let chunk_interval = Duration::from_millis(args.chunk_ms);

    log::info!(
        "Streaming {} samples at {} Hz in {}ms frames",
        samples.len(),
        spec.sample_rate,
        args.chunk_ms
    );

    let mut last_send = Instant::now();
    for chunk in samples.chunks(samples_per_chunk) {
        let mut pcm = Vec::with_capacity(chunk.len() * 2);
        for &sample in chunk {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }

        // Maintain real-time pacing
        let elapsed = last_send.elapsed();
        if elapsed < chunk_interval {
            tokio::time::sleep(chunk_interval - elapsed).await;
        }
        last_send = Instant::now();

        client.write_binary(pcm).await?;
    }

    log::info!("Audio finished");
    Ok(())
}
