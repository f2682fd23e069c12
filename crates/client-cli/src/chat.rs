//! Interactive chat loop on top of `ChatController`.

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::controller::{ChatBackend, ChatController, ControllerError, Conversation};
use crate::model::ModelClient;
use crate::outbox::FlushReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Exit,
}

pub fn warn_flush(report: &FlushReport) {
    if report.pending > 0 {
        eprintln!(
            "\x1b[33m⚠ {} message(s) not yet saved to the server; will retry\x1b[0m",
            report.pending
        );
    }
    for entry in &report.failed {
        eprintln!(
            "\x1b[31m✗ Could not save message #{}: {}\x1b[0m",
            entry.seq,
            entry.last_error.as_deref().unwrap_or("unknown error")
        );
    }
}

/// Run a chat against stdin until `/exit` or end of input.
pub async fn run<B: ChatBackend, M: ModelClient>(
    mut chat: ChatController<B, M>,
    resume: Option<i64>,
) -> Result<()> {
    if let Some(session_id) = resume {
        let count = chat.resume(session_id).await?;
        for turn in chat.messages() {
            println!("\x1b[90m{}: {}\x1b[0m", turn.role, turn.content);
        }
        println!("\x1b[36mResumed session {} ({} messages)\x1b[0m", session_id, count);
    }

    println!("\x1b[36mType a message. /new starts a new conversation, /exit quits.\x1b[0m");
    println!("\x1b[90mThis assistant does not replace professional medical advice.\x1b[0m");

    let result = chat_loop(&mut chat, BufReader::new(tokio::io::stdin())).await;
    finish(&mut chat).await;
    Ok(result?)
}

pub async fn chat_loop<B, M, R>(chat: &mut ChatController<B, M>, input: R) -> std::io::Result<()>
where
    B: ChatBackend,
    M: ModelClient,
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\x1b[1myou>\x1b[0m ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        if handle_line(chat, &line).await == LineOutcome::Exit {
            return Ok(());
        }
    }
}

/// Handle one input line. Failures are printed and the chat carries on.
pub async fn handle_line<B: ChatBackend, M: ModelClient>(
    chat: &mut ChatController<B, M>,
    line: &str,
) -> LineOutcome {
    match line.trim() {
        "" => {}
        "/exit" | "/quit" => return LineOutcome::Exit,
        "/new" => {
            chat.new_conversation();
            println!("\x1b[36mStarted a new conversation\x1b[0m");
        }
        text => match chat.send(text).await {
            Ok(exchange) => {
                println!("\x1b[1;32massistant>\x1b[0m {}", exchange.reply);
                warn_flush(&exchange.flush);
            }
            Err(ControllerError::Model(e)) => {
                eprintln!("\x1b[31mModel error: {} (message not sent, try again)\x1b[0m", e);
            }
            Err(e) => {
                tracing::warn!("Chat request failed: {}", e);
                eprintln!("\x1b[31mServer error: {}\x1b[0m", e);
            }
        },
    }
    LineOutcome::Continue
}

/// Last delivery attempt for queued history, then report what was lost.
pub async fn finish<B: ChatBackend, M: ModelClient>(chat: &mut ChatController<B, M>) -> FlushReport {
    let report = chat.flush().await;
    warn_flush(&report);

    let lost = chat.outbox().dead_letters().len();
    if lost > 0 {
        eprintln!("\x1b[31m✗ {} message(s) from this run were not saved\x1b[0m", lost);
    }
    if let Conversation::Active { session_id } = chat.state() {
        println!(
            "\x1b[90mSession {} saved. Resume with 'medchat chat --resume {}'\x1b[0m",
            session_id, session_id
        );
    }
    report
}
