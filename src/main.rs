use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parley::audio::{AudioSink, CpalSink};
use parley::config::TtsProvider;
use parley::coordinator::Coordinator;
use parley::hotword::NoopHotword;
use parley::recognizer::DisabledRecognizer;
use parley::state::TurnState;
use parley::synth::{ElevenLabsSynthesizer, EspeakSynthesizer, OpenAiSynthesizer, Synthesizer};
use parley::{AgentClient, Config, SpeechPipeline};

/// Parley - conversational turn-taking core for voice assistants
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Path to a config file (defaults to the user config directory)
    #[arg(short, long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Speak text through the synthesis pipeline (no agent)
    Say {
        /// Text to speak
        text: String,
    },
    /// Run one typed turn against the configured agent and speak the reply
    Ask {
        /// Message to send
        message: String,

        /// Use the streaming endpoint
        #[arg(long)]
        stream: bool,
    },
    /// List voices for the configured synthesis provider
    Voices,
    /// Test speaker output with a sine tone
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parley=info",
        1 => "info,parley=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Say { text } => say(&config, &text).await,
        Command::Ask { message, stream } => {
            if stream {
                config.agent.streaming = true;
            }
            ask(config, &message).await
        }
        Command::Voices => voices(&config).await,
        Command::TestSpeaker => test_speaker().await,
    }
}

/// Speak text directly through the pipeline
async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    let pipeline = build_pipeline(config)?;
    pipeline.speak_text(text).await?;
    Ok(())
}

/// One typed turn through the coordinator
async fn ask(config: Config, message: &str) -> anyhow::Result<()> {
    let agent = Arc::new(AgentClient::new(&config.agent)?);
    let pipeline = build_pipeline(&config)?;

    let (coordinator, handle) = Coordinator::new(
        config,
        agent,
        Arc::new(DisabledRecognizer),
        Arc::new(NoopHotword),
        pipeline,
    );
    let runner = tokio::spawn(coordinator.run());

    let mut snapshots = handle.subscribe();
    handle.submit_text(message).await?;

    // Watch the turn through to completion: back at idle with either a
    // reply or an error published.
    let done = snapshots
        .wait_for(|s| s.state == TurnState::Idle && (s.reply.is_some() || s.error.is_some()))
        .await
        .map_err(|_| anyhow::anyhow!("coordinator stopped unexpectedly"))?
        .clone();

    drop(handle);
    runner.abort();

    if let Some(error) = done.error {
        anyhow::bail!("turn failed: {error}");
    }

    if let Some(reply) = done.reply {
        if let Some(model) = done.model {
            println!("[{model}] {reply}");
        } else {
            println!("{reply}");
        }
    }

    Ok(())
}

/// List voices for the configured provider
async fn voices(config: &Config) -> anyhow::Result<()> {
    let (cloud, local) = build_synthesizers(config)?;
    let provider: Arc<dyn Synthesizer> = cloud.unwrap_or(local);

    println!("Voices for provider \"{}\":", provider.name());
    for voice in provider.voices().await? {
        match voice.name {
            Some(name) => println!("  {} ({name})", voice.id),
            None => println!("  {}", voice.id),
        }
    }

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sink = CpalSink::new()?;

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for s in &samples {
            #[allow(clippy::cast_possible_truncation)]
            writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16)?;
        }
        writer.finalize()?;
    }

    sink.play(parley::AudioChunk {
        index: 0,
        bytes: cursor.into_inner(),
    })
    .await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Build the synthesis pipeline from configuration
fn build_pipeline(config: &Config) -> anyhow::Result<Arc<SpeechPipeline>> {
    let (cloud, local) = build_synthesizers(config)?;
    let sink = Arc::new(CpalSink::new()?);
    Ok(Arc::new(SpeechPipeline::new(cloud, local, sink)))
}

/// Build the configured cloud synthesizer (if any) and the local fallback
#[allow(clippy::type_complexity)]
fn build_synthesizers(
    config: &Config,
) -> anyhow::Result<(Option<Arc<dyn Synthesizer>>, Arc<dyn Synthesizer>)> {
    let voice = &config.voice;

    let cloud: Option<Arc<dyn Synthesizer>> = match voice.provider {
        TtsProvider::OpenAi => match &voice.openai_api_key {
            Some(key) => {
                let synth = match &voice.model {
                    Some(model) => OpenAiSynthesizer::with_model(
                        key.clone(),
                        voice.voice.clone(),
                        voice.speed,
                        model.clone(),
                    )?,
                    None => OpenAiSynthesizer::new(key.clone(), voice.voice.clone(), voice.speed)?,
                };
                Some(Arc::new(synth))
            }
            None => {
                tracing::info!("no OpenAI API key configured, local synthesis only");
                None
            }
        },
        TtsProvider::ElevenLabs => match &voice.elevenlabs_api_key {
            Some(key) => {
                let synth = match &voice.model {
                    Some(model) => ElevenLabsSynthesizer::with_model(
                        key.clone(),
                        voice.voice.clone(),
                        model.clone(),
                    )?,
                    None => ElevenLabsSynthesizer::new(key.clone(), voice.voice.clone())?,
                };
                Some(Arc::new(synth))
            }
            None => {
                tracing::info!("no ElevenLabs API key configured, local synthesis only");
                None
            }
        },
        TtsProvider::Local => None,
    };

    let local: Arc<dyn Synthesizer> = Arc::new(EspeakSynthesizer::with_voice(
        voice.local_voice.clone(),
        voice.local_rate_wpm,
    ));

    Ok((cloud, local))
}
