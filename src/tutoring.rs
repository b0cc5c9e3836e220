//! Interactive text tutoring loop.

use std::io::Write;

use futures_util::future::join_all;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::gemini::GeminiClient;
use crate::chat::images::extract_prompts;
use crate::chat::store::ConversationStore;
use crate::chat::{
    CURRICULUM, ERROR_NOTICE, Message, MessageImage, Sender, Topic, find_topic,
    history_from_messages,
};
use crate::config::Config;
use crate::error::{Result, TutorError};

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Say(&'a str),
    Topics,
    Topic(&'a str),
    Clear,
    Quit,
    Empty,
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line);
    };
    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map_or((rest, ""), |(n, a)| (n, a.trim()));
    match (name, arg) {
        ("quit" | "exit", _) => Command::Quit,
        ("topics", _) => Command::Topics,
        ("topic", id) if !id.is_empty() => Command::Topic(id),
        ("clear", _) => Command::Clear,
        _ => Command::Unknown(line),
    }
}

fn topic_lines() -> Vec<String> {
    CURRICULUM
        .iter()
        .map(|t| {
            format!(
                "  {:<22} {} [{}]\n  {:<22} {}",
                t.id, t.title, t.difficulty, "", t.description
            )
        })
        .collect()
}

/// Settle the transcript after a failed reply: keep any partial text,
/// drop an empty placeholder, and add the apology notice.
fn record_failure(messages: &mut Vec<Message>, reply_id: &str, partial: &str) {
    if let Some(reply) = messages.iter_mut().find(|m| m.id == reply_id) {
        reply.text = partial.to_string();
        reply.is_streaming = false;
    }
    messages.retain(|m| !(m.id == reply_id && m.text.is_empty()));
    messages.push(Message::system(ERROR_NOTICE));
}

/// Conversation state plus the services that extend it.
pub struct Tutor {
    client: GeminiClient,
    store: ConversationStore,
    messages: Vec<Message>,
    topic: Option<String>,
    images: bool,
}

impl Tutor {
    /// Resume whatever the store holds.
    #[must_use]
    pub fn new(client: GeminiClient, store: ConversationStore, images: bool) -> Self {
        let messages = store.load_messages();
        let topic = store.load_topic();
        Self {
            client,
            store,
            messages,
            topic,
            images,
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn active_topic(&self) -> Option<&'static Topic> {
        self.topic.as_deref().and_then(find_topic)
    }

    fn persist(&self) {
        if let Err(e) = self.store.save_messages(&self.messages) {
            tracing::warn!("{e}");
        }
    }

    /// Switch topic and ask its opening question.
    pub async fn select_topic(&mut self, topic: &Topic) -> Result<()> {
        self.topic = Some(topic.id.to_string());
        self.store.save_topic(Some(topic.id))?;
        self.messages
            .push(Message::system(format!("Tema seleccionado: {}", topic.title)));
        println!("Tema seleccionado: {}\n", topic.title);
        self.send(topic.initial_prompt).await
    }

    pub fn clear(&mut self) -> Result<()> {
        self.messages.clear();
        self.topic = None;
        self.store.clear()
    }

    /// One user turn: stream the reply to stdout, then render its diagrams.
    pub async fn send(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let history = history_from_messages(&self.messages);
        self.messages.push(Message::user(text));
        let reply = Message::streaming_reply();
        let reply_id = reply.id.clone();
        self.messages.push(reply);
        self.persist();

        let mut partial = String::new();
        let result = self
            .client
            .stream_reply(&history, text, |chunk| {
                print!("{chunk}");
                let _ = std::io::stdout().flush();
                partial.push_str(chunk);
            })
            .await;
        println!("\n");

        let full = match result {
            Ok(full) => full,
            Err(e) => {
                record_failure(&mut self.messages, &reply_id, &partial);
                self.persist();
                return Err(e);
            }
        };

        let prompts = if self.images {
            extract_prompts(&full)
        } else {
            Vec::new()
        };

        if let Some(reply) = self.messages.iter_mut().find(|m| m.id == reply_id) {
            reply.text = full;
            reply.is_streaming = false;
            reply.images = prompts.iter().map(MessageImage::pending).collect();
        }
        self.persist();

        if !prompts.is_empty() {
            self.render_images(&reply_id, &prompts).await;
        }
        Ok(())
    }

    async fn render_images(&mut self, reply_id: &str, prompts: &[String]) {
        eprintln!("Generando {} diagrama(s)...", prompts.len());

        let results = join_all(prompts.iter().map(|p| self.client.generate_image(p))).await;

        let mut saved = Vec::with_capacity(results.len());
        for (index, bytes) in results.into_iter().enumerate() {
            let path = bytes.and_then(|bytes| {
                self.store
                    .save_image(reply_id, index, &bytes)
                    .map_err(|e| tracing::warn!("{e}"))
                    .ok()
            });
            saved.push(path);
        }

        if let Some(reply) = self.messages.iter_mut().find(|m| m.id == reply_id) {
            for (image, path) in reply.images.iter_mut().zip(&saved) {
                image.is_loading = false;
                image.path = path.as_ref().map(|p| p.display().to_string());
            }
        }
        self.persist();

        for (prompt, path) in prompts.iter().zip(&saved) {
            match path {
                Some(p) => eprintln!("  [diagrama] {prompt}: {}", p.display()),
                None => eprintln!("  [diagrama] {prompt}: no disponible"),
            }
        }
        eprintln!();
    }
}

fn report(result: Result<()>) {
    if let Err(e) = result {
        tracing::debug!("turn failed: {e}");
        eprintln!("{ERROR_NOTICE}\n  ({e})\n");
    }
}

/// Run the chat REPL until `/quit` or end of input.
pub async fn run_chat(config: &Config, start_topic: Option<&str>) -> Result<()> {
    let client = GeminiClient::new(&config.chat, config.api_key()?);
    let store = ConversationStore::open(Config::expand_path(&config.storage.directory))?;
    let mut tutor = Tutor::new(client, store, config.chat.images);

    let resumed = tutor
        .messages()
        .iter()
        .filter(|m| m.sender != Sender::System)
        .count();
    if resumed > 0 {
        eprintln!("Continuando conversación ({resumed} mensajes).");
    }
    if let Some(topic) = tutor.active_topic() {
        eprintln!("Tema activo: {}", topic.title);
    }
    eprintln!("Escribe tu pregunta. Comandos: /topics, /topic <id>, /clear, /quit\n");

    if let Some(id) = start_topic {
        let topic =
            find_topic(id).ok_or_else(|| TutorError::Config(format!("unknown topic: {id}")))?;
        report(tutor.select_topic(topic).await);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_command(&line) {
            Command::Empty => {}
            Command::Quit => break,
            Command::Topics => {
                for line in topic_lines() {
                    println!("{line}");
                }
            }
            Command::Topic(id) => match find_topic(id) {
                Some(topic) => report(tutor.select_topic(topic).await),
                None => eprintln!("Tema desconocido: {id} (usa /topics)"),
            },
            Command::Clear => {
                tutor.clear()?;
                eprintln!("Conversación borrada.");
            }
            Command::Say(text) => report(tutor.send(text).await),
            Command::Unknown(cmd) => eprintln!("Comando desconocido: {cmd}"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_questions() {
        assert_eq!(parse_command("  ¿qué es un módulo? "), Command::Say("¿qué es un módulo?"));
        assert_eq!(parse_command("   "), Command::Empty);
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command("/exit"), Command::Quit);
        assert_eq!(parse_command("/topics"), Command::Topics);
        assert_eq!(parse_command("/topic  http-apis "), Command::Topic("http-apis"));
        assert_eq!(parse_command("/clear"), Command::Clear);
        assert_eq!(parse_command("/topic"), Command::Unknown("/topic"));
        assert_eq!(parse_command("/dance"), Command::Unknown("/dance"));
    }

    #[test]
    fn every_topic_is_listed() {
        let lines = topic_lines();
        assert_eq!(lines.len(), CURRICULUM.len());
        assert!(lines[0].contains("intro"));
        assert!(lines[0].contains("[Beginner]"));
    }

    #[test]
    fn failure_drops_empty_placeholder() {
        let reply = Message::streaming_reply();
        let id = reply.id.clone();
        let mut messages = vec![Message::user("hola"), reply];
        record_failure(&mut messages, &id, "");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].sender, Sender::System);
        assert_eq!(messages[1].text, ERROR_NOTICE);
    }

    #[test]
    fn failure_keeps_partial_reply() {
        let reply = Message::streaming_reply();
        let id = reply.id.clone();
        let mut messages = vec![Message::user("hola"), reply];
        record_failure(&mut messages, &id, "Primero");

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].text, "Primero");
        assert!(!messages[1].is_streaming);
        assert_eq!(messages[2].sender, Sender::System);
    }
}
