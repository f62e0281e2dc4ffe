use crate::config::Config;
use crate::extract_image_text::ImageText;
use crate::retrieve_chunks::Hit;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

pub fn build_messages(cfg: &Config, prompt: String) -> Vec<Message> {
    vec![
        Message { role: "system".to_string(), content: cfg.system_prompt.clone() },
        Message { role: "user".to_string(), content: prompt },
    ]
}

pub fn build_prompt(
    question: &str,
    discourse_context: &str,
    course_context: &str,
    image: Option<&ImageText>,
) -> String {
    let image_section = match image {
        None => String::new(),
        Some(ImageText::NoText) => {
            "\n\nThe student provided an image, but no text could be extracted.".to_string()
        }
        Some(ImageText::Text(text)) => {
            format!("\n\nThe student also provided an image with the following text:\n{}", text)
        }
    };

    format!(
        r#"
You are a Virtual Teaching Assistant for the Tools in Data Science course. A student asked:

"{question}"{image_section}

Use **ONLY** the provided context (Forum Posts, Course Material, and any extracted image text) to answer the question clearly, briefly citing excerpts with URLs.
If you cannot answer the question based on the context or are uncertain, respond with a clear refusal and set `"links": []`.

Respond **ONLY** in this JSON format:

```json
{{
  "answer": "<a comprehensive yet concise answer, or a clear refusal>",
  "links": [
    {{
      "url": "<exact_url_1>",
      "text": "<brief quote or description>"
    }},
    {{
      "url": "<exact_url_2>",
      "text": "<brief quote or description>"
    }}
  ]
}}
```

Requirements:
Do not invent or infer, stick strictly to what is in the context.
Copy URLs exactly as they appear in the context.

----------------
Forum Posts:
{discourse_context}

Course Material:
{course_context}

"#
    )
}

/// Joins hits into one block, `text` then `URL:` line per hit, in hit order.
pub fn format_context_from_hits(hits: &[Hit]) -> String {
    hits.iter()
        .map(|hit| format!("{}\nURL: {}", hit.text(), hit.url()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
