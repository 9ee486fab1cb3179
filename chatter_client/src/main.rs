use chatter::{
    CancellationToken, ChatCompletionRequestMessage, ChunkedResponse, Client, ClientConfig,
    CreateChatCompletionRequest, Error, StreamedReply,
};
use ctrlc::set_handler;
use futures::StreamExt;
use pico_args::Arguments;
use rustyline::{
    Cmd, ConditionalEventHandler, DefaultEditor, Event, EventContext, EventHandler, KeyEvent,
    error::ReadlineError,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::{collections::VecDeque, thread};
use tokio::sync::mpsc::{Receiver, Sender};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod models;

use models::repl::{ServerRequest, ServerResponse, UserRequest};

/// Loop for interacting with the API. Waits for a new message request,
/// and, when one is received, streams the response in chunks until it
/// finishes or an interrupt signal cancels it.
async fn client(client: Client, mut rx: Receiver<ServerRequest>, tx: Sender<ServerResponse>) {
    while let Some(request) = rx.recv().await {
        let ServerRequest::Start(request) = request else {
            continue;
        };
        let cancel = CancellationToken::new();
        let mut stream = client.create_chat_completion_stream(request, cancel.clone());
        loop {
            let message = tokio::select! {
                item = stream.next() => match item {
                    Some(Ok(chunk)) => ServerResponse::Chunk(chunk),
                    Some(Err(Error::Cancelled)) => ServerResponse::Cancelled,
                    Some(Err(err)) => ServerResponse::Error(err.to_string()),
                    None => ServerResponse::Done,
                },
                Some(ServerRequest::Cancel) = rx.recv() => {
                    debug!("cancelling response stream");
                    cancel.cancel();
                    continue
                }
            };
            let finished = !matches!(message, ServerResponse::Chunk(_));
            if tx.send(message).await.is_err() {
                return;
            }
            if finished {
                break;
            }
        }
    }
}

struct InterruptEventHandler;

impl ConditionalEventHandler for InterruptEventHandler {
    fn handle(
        &self,
        _: &Event,
        _: rustyline::RepeatCount,
        _: bool,
        ctx: &EventContext,
    ) -> Option<rustyline::Cmd> {
        if ctx.line().is_empty() {
            Some(Cmd::EndOfFile)
        } else {
            Some(Cmd::Interrupt)
        }
    }
}

fn history_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(".chatter_history"))
}

/// User REPL loop. The user can enter chat messages or clear their input
/// using this loop. If a message is sent, a response is streamed from
/// the API and this REPL is inactive until the response finishes or
/// the stream is interrupted through the other CTRL+C handler.
fn repl(mut rx: Receiver<()>, tx: Sender<UserRequest>) -> Result<(), ReadlineError> {
    let mut rl = DefaultEditor::new()?;
    let interrupt_event_handler = Box::new(InterruptEventHandler);
    rl.bind_sequence(
        KeyEvent::ctrl('c'),
        EventHandler::Conditional(interrupt_event_handler),
    );
    let history_path = history_path();
    if let Some(path) = &history_path {
        // A missing history file just means a first run.
        let _ = rl.load_history(path);
    }

    while rx.blocking_recv().is_some() {
        loop {
            match rl.readline(">> ") {
                Ok(input) if input.trim().is_empty() => {}
                Ok(input) => {
                    rl.add_history_entry(input.as_str())?;
                    if tx.blocking_send(UserRequest::Prompt(input)).is_err() {
                        return Ok(());
                    }
                    break;
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                }
                Err(ReadlineError::Eof) => {
                    if let Some(path) = &history_path {
                        if let Err(err) = rl.save_history(path) {
                            warn!("failed to save REPL history: {err}");
                        }
                    }
                    std::process::exit(0);
                }
                Err(err) => return Err(err),
            }
        }
    }
    Ok(())
}

/// For catching user interrupts during a response stream. If a response
/// stream is not active, then the interrupt handler from the REPL takes
/// precedence and this doesn't catch the signal.
fn ctrlc_handler(tx: Sender<UserRequest>) -> Result<(), ctrlc::Error> {
    set_handler(move || {
        if tx.blocking_send(UserRequest::Cancel).is_err() {
            warn!("interrupt dropped, main loop is gone");
        }
    })?;

    thread::park();

    Ok(())
}

/// History is used for maintaining a context limit, counted in messages.
/// Context limit is set as a CLI option.
struct History {
    limit: usize,
    model: String,
    reply: StreamedReply,
    message_history: VecDeque<ChatCompletionRequestMessage>,
}

impl History {
    pub fn len(&self) -> usize {
        self.message_history.len()
    }

    pub fn new(limit: usize, model: String) -> Self {
        Self {
            limit,
            model,
            reply: StreamedReply::new(),
            message_history: VecDeque::new(),
        }
    }

    /// Drops the pending reply and the user message that asked for it.
    pub fn abandon_reply(&mut self) {
        self.reply = StreamedReply::new();
        if self.len() % 2 == 1 {
            self.message_history.pop_back();
        }
    }

    pub fn push_assistant_chunk<'a>(&mut self, chunk: &'a ChunkedResponse) -> Option<&'a str> {
        self.reply.apply_chunk(chunk)
    }

    pub fn push_assistant_reply(&mut self) {
        let reply = std::mem::take(&mut self.reply);
        self.message_history.push_back(reply.into_message());

        // Prune whole exchanges so the history always starts with a user message.
        while self.message_history.len() > self.limit && self.message_history.len() >= 2 {
            self.message_history = self.message_history.split_off(2);
        }
    }

    pub fn push_user(&mut self, content: String) -> CreateChatCompletionRequest {
        self.message_history
            .push_back(ChatCompletionRequestMessage::user(content));
        CreateChatCompletionRequest::builder()
            .model(self.model.clone())
            .messages(self.message_history.iter().cloned().collect())
            .build()
    }
}

const HELP: &str = "\
Chat with an OpenAI-compliant assistant

USAGE:
  chatter_client [OPTIONS]

OPTIONS:
  --config  Client config file  [default: $CHATTER_CONFIG_PATH]
  --model   Chat model          [default: gpt-3.5-turbo]
  --limit   Chat history limit  [default: 20]

FLAGS:
  -h, --help    Print help information
";

struct Args {
    config: Option<PathBuf>,
    model: String,
    history_limit: usize,
}

fn load_config(path: Option<PathBuf>) -> Result<ClientConfig, chatter::ConfigError> {
    match path {
        Some(path) => ClientConfig::from_path(path),
        None => ClientConfig::from_env().or_else(|err| match err {
            chatter::ConfigError::MissingPath(_) => {
                warn!("no client config given, using defaults");
                Ok(ClientConfig::default())
            }
            err => Err(err),
        }),
    }
}

/// Minimal REPL
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    let mut pargs = Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        println!("{}", HELP);
        std::process::exit(0);
    }

    let args = Args {
        config: pargs.opt_value_from_str("--config")?,
        model: pargs
            .value_from_str("--model")
            .unwrap_or("gpt-3.5-turbo".into()),
        history_limit: pargs.value_from_str("--limit").unwrap_or(20),
    };
    let Args {
        config,
        model,
        history_limit,
    } = args;
    let chat_client = Client::new(load_config(config)?)?;

    // Channels for all the IPC going on.
    let (start_repl_sender, start_repl_receiver) = tokio::sync::mpsc::channel(1);
    let (user_request_sender, mut user_request_receiver): (
        Sender<UserRequest>,
        Receiver<UserRequest>,
    ) = tokio::sync::mpsc::channel(1);
    let ctrlc_user_request_sender = user_request_sender.clone();
    let (server_request_sender, server_request_receiver): (
        Sender<ServerRequest>,
        Receiver<ServerRequest>,
    ) = tokio::sync::mpsc::channel(1);
    let (server_response_sender, mut server_response_receiver): (
        Sender<ServerResponse>,
        Receiver<ServerResponse>,
    ) = tokio::sync::mpsc::channel(1);

    // Begin background processes.
    thread::spawn(|| repl(start_repl_receiver, user_request_sender));
    tokio::spawn(client(
        chat_client,
        server_request_receiver,
        server_response_sender,
    ));
    thread::spawn(|| ctrlc_handler(ctrlc_user_request_sender));

    // Kick-off the user prompt.
    start_repl_sender.send(()).await?;

    // Main loop.
    let mut history = History::new(history_limit, model);
    loop {
        tokio::select! {
            Some(user_request) = user_request_receiver.recv() => {
                let server_request = match user_request {
                    UserRequest::Prompt(input) => {
                        let request = history.push_user(input);
                        ServerRequest::Start(request)
                    }
                    UserRequest::Cancel => ServerRequest::Cancel
                };
                server_request_sender.send(server_request).await?;
            }
            Some(server_response) = server_response_receiver.recv() => {
                match server_response {
                    ServerResponse::Chunk(chunk) => {
                        if let Some(content) = history.push_assistant_chunk(&chunk) {
                            print!("{content}");
                            io::stdout().flush()?;
                        }
                    }
                    ServerResponse::Done => {
                        history.push_assistant_reply();
                        println!();
                        start_repl_sender.send(()).await?
                    }
                    ServerResponse::Cancelled => {
                        // A cancelled reply is incomplete, so neither it nor
                        // the prompt that started it stays in the history.
                        history.abandon_reply();
                        println!();
                        start_repl_sender.send(()).await?
                    }
                    ServerResponse::Error(err) => {
                        history.abandon_reply();
                        println!("Error: {err}");
                        start_repl_sender.send(()).await?;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::History;
    use chatter::ChunkedResponse;
    use serde_json::json;

    fn content_chunk(content: &str) -> ChunkedResponse {
        serde_json::from_value(json!({
            "id": "1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "m",
            "choices": [{"index": 0, "delta": {"content": content}}]
        }))
        .unwrap()
    }

    #[test]
    fn pruning_history() {
        let mut history = History::new(4, "m".to_string());

        // Add a user message and verify that nothing can be pruned yet.
        let request = history.push_user("Hello! What's your name?".to_string());
        assert_eq!(request.messages.len(), 1);
        assert_eq!(history.len(), 1);

        // Simulate an assistant response in chunks. The history stays the
        // same length until the reply is finished.
        for s in ["I", " have", " no", " name"] {
            let chunk = content_chunk(s);
            assert_eq!(history.push_assistant_chunk(&chunk), Some(s));
        }
        assert_eq!(history.len(), 1);
        history.push_assistant_reply();
        assert_eq!(history.len(), 2);
        assert_eq!(history.message_history[1].content, "I have no name");

        // A second exchange fits in the limit.
        history.push_user("oh...".to_string());
        history.push_assistant_chunk(&content_chunk(":("));
        history.push_assistant_reply();
        assert_eq!(history.len(), 4);

        // A third pushes the first one out.
        let request = history.push_user("bye".to_string());
        assert_eq!(request.messages.len(), 5);
        history.push_assistant_chunk(&content_chunk("bye"));
        history.push_assistant_reply();
        assert_eq!(history.len(), 4);
        assert_eq!(history.message_history[0].content, "oh...");
    }

    #[test]
    fn abandoned_replies_are_forgotten() {
        let mut history = History::new(10, "m".to_string());
        history.push_user("Tell me a long story".to_string());
        history.push_assistant_chunk(&content_chunk("Once upon"));
        history.abandon_reply();
        assert_eq!(history.len(), 0);

        history.push_user("Hi".to_string());
        history.push_assistant_chunk(&content_chunk("Hello"));
        history.push_assistant_reply();
        assert_eq!(history.message_history[1].content, "Hello");
    }
}
