//! Chat client session: handshake, then concurrent reading and writing.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hiroba_shared::{
    digest::password_digest,
    protocol::{Packet, PacketCodec, PacketType, field},
    time::{SystemClock, message_time_now},
};
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::{net::TcpStream, sync::mpsc, time::timeout};
use tokio_util::codec::Framed;

use crate::error::ClientError;

use super::{
    domain::{ReplyOutcome, reply_outcome},
    formatter::MessageFormatter,
    runner::ClientOptions,
    ui::redisplay_prompt,
};

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Decode limit for server packets; `inform_joiner` carries the whole group history
pub const MAX_SERVER_FRAME_LEN: usize = 64 * 1024 * 1024;

type Connection = Framed<TcpStream, PacketCodec>;

/// Wait for the reply to `step`, keeping any broadcasts that arrive meanwhile
async fn await_reply(
    connection: &mut Connection,
    step: PacketType,
    pending: &mut Vec<Packet>,
) -> Result<(), ClientError> {
    loop {
        let packet = timeout(REPLY_TIMEOUT, connection.next())
            .await
            .map_err(|_| ClientError::Timeout(step))?
            .ok_or(ClientError::ConnectionClosed)??;

        match reply_outcome(&packet, step) {
            Some(ReplyOutcome::Accepted) => return Ok(()),
            Some(ReplyOutcome::Rejected(reason)) => {
                return Err(ClientError::Rejected { step, reason });
            }
            None => pending.push(packet),
        }
    }
}

/// Wait for `inform_joiner`, keeping anything else that arrives first
async fn await_inform_joiner(
    connection: &mut Connection,
    pending: &mut Vec<Packet>,
) -> Result<Packet, ClientError> {
    loop {
        let packet = timeout(REPLY_TIMEOUT, connection.next())
            .await
            .map_err(|_| ClientError::Timeout(PacketType::InformJoiner))?
            .ok_or(ClientError::ConnectionClosed)??;
        if packet.kind() == Some(PacketType::InformJoiner) {
            return Ok(packet);
        }
        pending.push(packet);
    }
}

/// Register (optionally), log in and join the group.
///
/// `register` is cleared once registration succeeds so reconnects only log in.
/// Returns the `inform_joiner` packet plus anything that arrived before it.
async fn handshake(
    connection: &mut Connection,
    options: &ClientOptions,
    register: &mut bool,
) -> Result<(Packet, Vec<Packet>), ClientError> {
    let password = password_digest(&options.password);
    let group_password = password_digest(&options.group_password);
    let mut pending = Vec::new();

    if *register {
        connection
            .send(Packet::register(&options.username, &password))
            .await?;
        await_reply(connection, PacketType::Register, &mut pending).await?;
        tracing::info!("Registered as '{}'", options.username);
        *register = false;
    }

    connection
        .send(Packet::login(&options.username, &password))
        .await?;
    await_reply(connection, PacketType::Login, &mut pending).await?;

    connection
        .send(Packet::connect_group(
            &options.username,
            &options.group,
            &group_password,
        ))
        .await?;
    await_reply(connection, PacketType::ConnectGroup, &mut pending).await?;
    let inform = await_inform_joiner(connection, &mut pending).await?;

    Ok((inform, pending))
}

/// Render a server packet for the terminal
fn render(packet: &Packet) -> String {
    let username = packet.str_field(field::USERNAME).unwrap_or("?");
    match packet.kind() {
        Some(PacketType::UserJoined) => MessageFormatter::format_user_joined(username),
        Some(PacketType::UserLeft) => MessageFormatter::format_user_left(username),
        Some(PacketType::Message) => MessageFormatter::format_chat_message(
            packet.str_field(field::SENDER).unwrap_or("?"),
            packet.str_field(field::TEXT).unwrap_or_default(),
            packet.str_field(field::TIME).unwrap_or_default(),
        ),
        _ => MessageFormatter::format_raw_packet(
            &serde_json::Value::Object(packet.as_object().clone()).to_string(),
        ),
    }
}

/// Run one chat session until the user quits or the connection drops
pub async fn run_client_session(
    options: &ClientOptions,
    register: &mut bool,
) -> Result<(), ClientError> {
    let stream = TcpStream::connect(&options.addr).await?;
    let mut connection = Framed::new(
        stream,
        PacketCodec::with_max_frame_len(MAX_SERVER_FRAME_LEN),
    );
    tracing::info!("Connected to chat server at {}", options.addr);

    let (inform, pending) = handshake(&mut connection, options, register).await?;
    print!(
        "{}",
        MessageFormatter::format_group_joined(
            &options.group,
            &inform.string_list(field::USERNAMES).unwrap_or_default(),
            &inform.history().unwrap_or_default(),
            &options.username,
        )
    );
    for packet in &pending {
        print!("{}", render(packet));
    }
    println!(
        "\nYou are '{}'. Type messages and press Enter to send. Press Ctrl+C to exit.\n",
        options.username
    );

    let (mut write, mut read) = connection.split();

    // Spawn a task to handle incoming packets
    let username_for_read = options.username.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(packet) => {
                    print!("{}", render(&packet));
                    redisplay_prompt(&username_for_read);
                }
                Err(e) => return Err(ClientError::Connection(e)),
            }
        }
        Err(ClientError::ConnectionClosed)
    });

    // Create channel for rustyline input
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();

    // Spawn a blocking thread for rustyline (synchronous readline)
    let prompt = format!("{}> ", options.username);
    let _readline_handle = std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if input_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    // Spawn a task to send typed lines as chat messages
    let username_for_write = options.username.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(line) = input_rx.recv().await {
            let time = message_time_now(&SystemClock);
            write.send(Packet::chat(&line, Some(time.as_str()))).await?;

            print!("\n{}", MessageFormatter::format_sent_confirmation(&time));
            redisplay_prompt(&username_for_write);
        }
        Ok::<(), ClientError>(())
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        read_result = &mut read_task => {
            write_task.abort();
            read_result.unwrap_or(Err(ClientError::ConnectionClosed))
        }
        write_result = &mut write_task => {
            read_task.abort();
            write_result.unwrap_or(Err(ClientError::ConnectionClosed))
        }
    }
}
