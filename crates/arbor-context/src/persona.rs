/// Final system instruction: the request prompt, then the thread persona,
/// separated by a blank line. Blank inputs count as absent.
pub fn compose_system_prompt(request_prompt: Option<&str>, thread_prompt: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [request_prompt, thread_prompt]
        .into_iter()
        .flatten()
        .filter(|p| !p.trim().is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}
