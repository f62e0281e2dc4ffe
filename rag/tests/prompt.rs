use rag::{
    build_messages, build_prompt, format_context_from_hits, retrieve_top, Config, Corpus, Entry,
    FlatIndex, ImageText,
};
use serde_json::json;

fn hits_for(texts: &[(&str, &str)], rows: &[Vec<f32>]) -> Vec<rag::Hit> {
    let entries: Vec<Entry> = texts
        .iter()
        .map(|(text, url)| {
            serde_json::from_value(json!({"text": text, "metadata": {"url": url}}))
                .expect("entry fixture should deserialize")
        })
        .collect();
    let corpus = Corpus::new(
        "course",
        FlatIndex::from_rows(rows).expect("index"),
        entries,
    )
    .expect("corpus");
    retrieve_top(&corpus, &[0.0], texts.len()).expect("retrieval")
}

#[test]
fn context_follows_retrieval_order() {
    let hits = hits_for(
        &[("far", "https://c/far"), ("near", "https://c/near")],
        &[vec![9.0], vec![0.5]],
    );
    assert_eq!(
        format_context_from_hits(&hits),
        "near\nURL: https://c/near\n\nfar\nURL: https://c/far"
    );
    assert_eq!(format_context_from_hits(&[]), "");
}

#[test]
fn prompt_is_deterministic() {
    let image = ImageText::Text("x = 1".to_string());
    let a = build_prompt("What is x?", "forum", "course", Some(&image));
    let b = build_prompt("What is x?", "forum", "course", Some(&image));
    assert_eq!(a, b);
}

#[test]
fn prompt_embeds_question_and_both_contexts() {
    let prompt = build_prompt(
        "When is the exam?",
        "exam is on Sunday\nURL: https://d/1",
        "see the schedule\nURL: https://c/1",
        None,
    );
    assert!(prompt.contains("\"When is the exam?\""));
    let forum_at = prompt
        .find("Forum Posts:\nexam is on Sunday\nURL: https://d/1")
        .expect("forum block");
    let course_at = prompt
        .find("Course Material:\nsee the schedule\nURL: https://c/1")
        .expect("course block");
    assert!(forum_at < course_at);
    assert!(prompt.contains("\"links\": []"));
}

#[test]
fn image_section_has_three_distinct_forms() {
    let omitted = build_prompt("q", "d", "c", None);
    assert!(!omitted.contains("image with the following text"));
    assert!(!omitted.contains("no text could be extracted"));

    let empty = build_prompt("q", "d", "c", Some(&ImageText::NoText));
    assert!(empty.contains("\"q\"\n\nThe student provided an image, but no text could be extracted."));

    let text = build_prompt("q", "d", "c", Some(&ImageText::Text("Error 404".to_string())));
    assert!(text.contains("\"q\"\n\nThe student also provided an image with the following text:\nError 404"));
}

#[test]
fn messages_pair_system_instruction_with_prompt() {
    let cfg = Config { system_prompt: "Only use context.".to_string(), ..Config::default() };
    let messages = build_messages(&cfg, "prompt body".to_string());
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, "system");
    assert_eq!(messages[0].content, "Only use context.");
    assert_eq!(messages[1].role, "user");
    assert_eq!(messages[1].content, "prompt body");
}
