//! Text tutoring: curriculum, conversation model, and the Gemini text/image services.

pub mod gemini;
pub mod images;
pub mod store;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::genai::Content;

pub const SYSTEM_INSTRUCTION: &str = r#"Eres un experto tutor en la plataforma de automatización "Make" (anteriormente Integromat).
Tu objetivo es enseñar al usuario a crear automatizaciones paso a paso.
Adaptas tu lenguaje al nivel del usuario (Principiante, Intermedio, Experto).
Siempre proporciona ejemplos prácticos.
Si el usuario pregunta sobre código (JSON, XML, JavaScript en Make), usa bloques de código markdown.

REGLA DE ORO - VISUALIZACIÓN:
El usuario quiere ver diagramas, NO leer descripciones de cómo se ven.
1. ESTÁ PROHIBIDO escribir "Resumen Visual" o listas de texto describiendo círculos y flechas.
2. ES OBLIGATORIO generar una imagen para CADA paso importante o configuración de flujo.
3. Si explicas un proceso de 3 pasos, debes generar 3 imágenes (una por paso) insertando la etiqueta correspondiente.

Para generar una imagen, inserta esta etiqueta en una línea nueva justo después de explicar el concepto:
[GENERAR_IMAGEN: descripción técnica en inglés del diagrama de Make.com, estilo minimalista vector UI]

Ejemplo de flujo correcto:
"Primero configuramos el trigger de Google Sheets...
[GENERAR_IMAGEN: Make.com module Google Sheets green circle trigger]
Luego conectamos el router...
[GENERAR_IMAGEN: Make.com router module dividing flow into two paths]"

Sé amigable, paciente y muy técnico cuando se requiera.
Usa formato Markdown para estructurar tus respuestas."#;

/// Appended to the tutor instruction for spoken conversations.
pub const VOICE_SUFFIX: &str = " Estás en modo de voz, sé conciso y directo.";

/// Shown when a reply could not be produced.
pub const ERROR_NOTICE: &str =
    "Lo siento, hubo un error al conectar con el servicio de IA. Por favor intenta de nuevo.";

#[must_use]
pub fn voice_instruction() -> String {
    format!("{SYSTEM_INSTRUCTION}{VOICE_SUFFIX}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sender {
    User,
    Bot,
    System,
}

/// A diagram slot attached to a bot message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageImage {
    pub prompt: String,

    /// Saved image file, once generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default)]
    pub is_loading: bool,
}

impl MessageImage {
    #[must_use]
    pub fn pending(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            path: None,
            is_loading: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,

    #[serde(default)]
    pub is_streaming: bool,

    #[serde(default)]
    pub images: Vec<MessageImage>,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

impl Message {
    #[must_use]
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("{timestamp}-{seq}"),
            text: text.into(),
            sender,
            timestamp,
            is_streaming: false,
            images: Vec::new(),
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text)
    }

    /// Empty bot message that replies stream into.
    #[must_use]
    pub fn streaming_reply() -> Self {
        Self {
            is_streaming: true,
            ..Self::new(Sender::Bot, "")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Expert,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Expert => "Expert",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topic {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub difficulty: Difficulty,
    pub initial_prompt: &'static str,
}

pub static CURRICULUM: [Topic; 7] = [
    Topic {
        id: "intro",
        title: "Introducción a Make",
        description: "Conceptos básicos: Escenarios, Módulos y Triggers.",
        difficulty: Difficulty::Beginner,
        initial_prompt: "Hola, soy nuevo en Make. Explícame paso a paso los conceptos básicos y genera una imagen para cada concepto (Escenario, Módulo, Trigger).",
    },
    Topic {
        id: "data-structures",
        title: "Mapeo de Datos & Tipos",
        description: "Aprende a mover datos entre módulos y usar variables.",
        difficulty: Difficulty::Beginner,
        initial_prompt: "Quiero aprender a mapear datos. Muestrame paso a paso con imágenes cómo se conectan los datos de un módulo a otro.",
    },
    Topic {
        id: "routers-filters",
        title: "Routers y Filtros",
        description: "Lógica condicional para bifurcar tus automatizaciones.",
        difficulty: Difficulty::Intermediate,
        initial_prompt: "Enséñame a usar un Router. Genera un diagrama visual del flujo antes y después de añadir el router.",
    },
    Topic {
        id: "http-apis",
        title: "HTTP y APIs",
        description: "Conecta cualquier servicio usando el módulo HTTP.",
        difficulty: Difficulty::Intermediate,
        initial_prompt: "¿Cómo configuro un módulo HTTP para un GET? Muestrame la configuración con una imagen generada.",
    },
    Topic {
        id: "iterators-aggregators",
        title: "Iteradores y Agregadores",
        description: "Manejo avanzado de Arrays y colecciones de datos.",
        difficulty: Difficulty::Expert,
        initial_prompt: "Diferencia entre Iterador y Agregador. Ilustra cada uno con un diagrama generado.",
    },
    Topic {
        id: "error-handling",
        title: "Manejo de Errores",
        description: "Directivas de error: Resume, Ignore, Break, Rollback.",
        difficulty: Difficulty::Expert,
        initial_prompt: "Explica las directivas de error. Genera una imagen que muestre dónde se configura esto en el módulo.",
    },
    Topic {
        id: "custom-apps",
        title: "Apps Personalizadas",
        description: "Creación de apps propias usando JSON/API Key.",
        difficulty: Difficulty::Expert,
        initial_prompt: "Pasos para crear una App personalizada en Make. Ilustra la interfaz de My Apps.",
    },
];

#[must_use]
pub fn find_topic(id: &str) -> Option<&'static Topic> {
    CURRICULUM.iter().find(|t| t.id == id)
}

/// Model-facing history for a transcript.
///
/// System notices are skipped and image tags removed. Consecutive turns from
/// the same side are merged, and a trailing user turn is dropped since the
/// next request supplies the new user message itself.
#[must_use]
pub fn history_from_messages(messages: &[Message]) -> Vec<Content> {
    let mut history: Vec<Content> = Vec::new();

    for message in messages {
        let role = match message.sender {
            Sender::System => continue,
            Sender::User => "user",
            Sender::Bot => "model",
        };

        let text = images::strip_tags(&message.text);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        match history.last_mut() {
            Some(last) if last.role.as_deref() == Some(role) => {
                if let Some(part) = last.parts.first_mut() {
                    let merged = part.text.get_or_insert_with(String::new);
                    merged.push_str("\n\n");
                    merged.push_str(text);
                }
            }
            _ => history.push(Content::text(Some(role), text)),
        }
    }

    if history
        .last()
        .is_some_and(|c| c.role.as_deref() == Some("user"))
    {
        history.pop();
    }

    history
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(history: &[Content]) -> Vec<(String, String)> {
        history
            .iter()
            .map(|c| (c.role.clone().unwrap_or_default(), c.joined_text()))
            .collect()
    }

    fn msg(sender: Sender, text: &str) -> Message {
        Message::new(sender, text)
    }

    #[test]
    fn curriculum_ids_are_unique_and_findable() {
        for topic in &CURRICULUM {
            assert_eq!(find_topic(topic.id), Some(topic));
        }
        assert!(find_topic("nope").is_none());
        assert_eq!(find_topic("http-apis").map(|t| t.difficulty), Some(Difficulty::Intermediate));
    }

    #[test]
    fn voice_instruction_ends_with_suffix() {
        let instruction = voice_instruction();
        assert!(instruction.starts_with("Eres un experto tutor"));
        assert!(instruction.ends_with("sé conciso y directo."));
    }

    #[test]
    fn history_skips_system_and_merges_turns() {
        let messages = vec![
            msg(Sender::System, "Tema seleccionado: HTTP y APIs"),
            msg(Sender::User, "hola"),
            msg(Sender::User, "¿qué es un router?"),
            msg(
                Sender::Bot,
                "Un router divide el flujo.\n[GENERAR_IMAGEN: router diagram]",
            ),
            msg(Sender::Bot, "¿Algo más?"),
        ];
        assert_eq!(
            texts(&history_from_messages(&messages)),
            vec![
                ("user".to_string(), "hola\n\n¿qué es un router?".to_string()),
                (
                    "model".to_string(),
                    "Un router divide el flujo.\n\n¿Algo más?".to_string()
                ),
            ]
        );
    }

    #[test]
    fn trailing_user_turn_is_dropped() {
        let messages = vec![
            msg(Sender::User, "primera"),
            msg(Sender::Bot, "respuesta"),
            msg(Sender::User, "sin respuesta"),
        ];
        let history = history_from_messages(&messages);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role.as_deref(), Some("model"));
    }

    #[test]
    fn tag_only_messages_vanish() {
        let messages = vec![
            msg(Sender::User, "a"),
            msg(Sender::Bot, "[GENERAR_IMAGEN: only a picture]"),
            msg(Sender::User, "b"),
            msg(Sender::Bot, "c"),
        ];
        assert_eq!(
            texts(&history_from_messages(&messages)),
            vec![
                ("user".to_string(), "a\n\nb".to_string()),
                ("model".to_string(), "c".to_string()),
            ]
        );
    }

    #[test]
    fn message_json_matches_stored_shape() {
        let mut message = Message::streaming_reply();
        message.images.push(MessageImage::pending("flow"));
        let json = serde_json::to_value(&message).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(json["sender"], "BOT");
        assert_eq!(json["isStreaming"], true);
        assert_eq!(json["images"][0]["isLoading"], true);
        assert!(json["images"][0].get("path").is_none());
    }

    #[test]
    fn message_ids_are_distinct() {
        let a = Message::user("x");
        let b = Message::user("x");
        assert_ne!(a.id, b.id);
    }
}
