use beatbazaar_player::{
    AudioSystem, PlayerConfig, PlayerEvent, TrackRef, event_channel,
    util::{hook::set_panic_hook, log::initialize_logging},
};
use color_eyre::eyre::bail;

const USAGE: &str = "usage: beatbazaar-player [--owned] <url>...";

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> color_eyre::Result<()> {
    setup()?;

    let mut owned = false;
    let mut urls = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--owned" => owned = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ => urls.push(arg),
        }
    }
    if urls.is_empty() {
        bail!(USAGE);
    }

    let tracks: Vec<TrackRef> = urls
        .into_iter()
        .enumerate()
        .map(|(n, url)| {
            let id = format!("track-{}", n + 1);
            if owned {
                TrackRef::owned(id, url)
            } else {
                TrackRef::preview(id, url)
            }
        })
        .collect();

    let config = PlayerConfig::from_env()?;
    let (event_tx, event_rx) = event_channel();
    let system = AudioSystem::new(&config, event_tx).await?;
    let player = system.handle();

    let mut queue = tracks.into_iter();
    if let Some(track) = queue.next() {
        println!("loading {} ({})", track.id, track.audio_url);
        player.play(track);
    }

    loop {
        let advance = tokio::select! {
            event = event_rx.recv_async() => match event {
                Ok(PlayerEvent::TrackStarted(id)) => {
                    println!("playing {id}");
                    false
                }
                Ok(PlayerEvent::TrackEnded(id)) => {
                    println!("finished {id}");
                    true
                }
                Ok(PlayerEvent::PreviewLimitReached(id)) => {
                    println!(
                        "preview of {id} ended after {}s",
                        config.preview_limit.as_secs()
                    );
                    true
                }
                Ok(PlayerEvent::PlaybackFailed(failure)) => {
                    eprintln!("Audio Error: {}", failure.error);
                    true
                }
                Ok(PlayerEvent::StateChanged(_)) => false,
                Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        if advance {
            match queue.next() {
                Some(track) => {
                    println!("loading {} ({})", track.id, track.audio_url);
                    player.play(track);
                }
                None => break,
            }
        }
    }

    system.shutdown().await?;
    Ok(())
}

fn setup() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenv::dotenv().ok();
    set_panic_hook();
    initialize_logging()?;
    Ok(())
}
