use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{
    ChannelSession, HistoryApi, HistoryStore, MissingSessionProvider, SessionEvent,
    SessionProvider, SessionUser, StaticSession, WsChannelTransport,
};
use shared::domain::{ChannelId, ChannelScope, ServerId, TempId, UserId};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use uuid::Uuid;

mod config;
mod render;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_id: String,
    #[arg(long)]
    channel_id: String,
    /// Active session user id; omit to send as "Unknown user".
    #[arg(long)]
    user_id: Option<String>,
    #[arg(long)]
    display_name: Option<String>,
    #[arg(long)]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(api_url) = args.api_url {
        settings.api_url = api_url;
    }

    let provider: Arc<dyn SessionProvider> = match args.user_id {
        Some(user_id) => Arc::new(StaticSession(SessionUser {
            user_id: UserId::new(user_id),
            display_name: args.display_name.unwrap_or_default(),
        })),
        None => Arc::new(MissingSessionProvider),
    };
    let viewer = provider.current_user().map(|user| user.user_id);

    let scope = ChannelScope::new(
        ServerId::new(args.server_id),
        ChannelId::new(args.channel_id),
    );
    let transport = Arc::new(
        WsChannelTransport::connect_with_retry(&config::socket_target(&settings)).await?,
    );
    let session = ChannelSession::new(
        scope,
        settings.page_size,
        HistoryApi::new(settings.api_url.clone()),
        Arc::new(HistoryStore::new()),
        transport,
        provider,
    );

    session.open().await?;

    let channel_name = match session.channel_summary().await {
        Ok(summary) => summary.name,
        Err(err) => {
            warn!("failed to fetch channel metadata: {err}");
            session.scope().channel_id.to_string()
        }
    };
    println!("#{channel_name}");

    let timeline = session.timeline().await;
    if timeline.is_empty() {
        println!("No messages yet in #{channel_name}. Start the conversation!");
    } else {
        println!("{}", render::render_timeline(&timeline, viewer.as_ref()));
    }

    {
        let session = Arc::clone(&session);
        let viewer = viewer.clone();
        tokio::spawn(async move {
            let mut events = session.subscribe_events();
            while let Ok(event) = events.recv().await {
                match event {
                    SessionEvent::TimelineUpdated => {
                        let timeline = session.timeline().await;
                        println!("---");
                        println!("{}", render::render_timeline(&timeline, viewer.as_ref()));
                    }
                    SessionEvent::Error(message) => eprintln!("error: {message}"),
                }
            }
        });
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" {
            break;
        }
        if input == "/more" {
            match session.load_older().await {
                Ok(true) => {}
                Ok(false) => println!("(no older messages)"),
                Err(err) => eprintln!("history fetch failed: {err} (try /more again)"),
            }
            continue;
        }
        if input == "/refresh" {
            if let Err(err) = session.refresh().await {
                eprintln!("refresh failed: {err} (try /refresh again)");
            }
            continue;
        }
        if let Some(raw) = input.strip_prefix("/retry ") {
            match parse_temp_id(raw) {
                Some(temp_id) => match session.retry(&temp_id).await {
                    Ok(true) => {}
                    Ok(false) => println!("(nothing to retry under that id)"),
                    Err(err) => eprintln!("retry failed: {err}"),
                },
                None => println!("usage: /retry <id>"),
            }
            continue;
        }
        if let Some(raw) = input.strip_prefix("/dismiss ") {
            match parse_temp_id(raw) {
                Some(temp_id) => {
                    if !session.dismiss(&temp_id).await {
                        println!("(nothing to dismiss under that id)");
                    }
                }
                None => println!("usage: /dismiss <id>"),
            }
            continue;
        }

        if let Err(err) = session.send(input).await {
            eprintln!("send failed: {err}");
        }
    }

    session.close().await?;
    Ok(())
}

fn parse_temp_id(raw: &str) -> Option<TempId> {
    Uuid::parse_str(raw.trim()).ok().map(TempId)
}
