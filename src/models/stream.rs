use serde::{ Serialize, Deserialize };

/// One `data:` frame of the streaming chat reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamFrame {
    #[serde(rename = "chunk")] Chunk {
        chunk: String,
    },
    #[serde(rename = "complete")] Complete {
        #[serde(rename = "fullResponse")]
        full_response: String,
        #[serde(rename = "showDemoButton")]
        show_demo_button: bool,
        timestamp: String,
    },
    #[serde(rename = "error")] Error {
        error: String,
    },
}

impl StreamFrame {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamFrame::Chunk { .. })
    }
}
