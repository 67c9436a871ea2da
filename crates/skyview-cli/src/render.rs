//! Plain-text presentation of resolved timeline items.

use chrono::{DateTime, Utc};
use skyview_common::record::Verb;
use skyview_common::resolve::{ItemView, PostView, ProfileView, Slot};

const INDENT: &str = "    ";

/// Short age of a timestamp relative to `now`, or the calendar date once it
/// is more than a week old. Unparseable timestamps are shown verbatim.
pub fn relative_date(timestamp: &str, now: DateTime<Utc>) -> String {
    let Ok(at) = DateTime::parse_from_rfc3339(timestamp) else {
        return timestamp.to_string();
    };
    let at = at.with_timezone(&Utc);
    let age = now.signed_duration_since(at);

    if age.num_seconds() < 60 {
        "just now".to_string()
    } else if age.num_minutes() < 60 {
        format!("{}m", age.num_minutes())
    } else if age.num_hours() < 24 {
        format!("{}h", age.num_hours())
    } else if age.num_days() < 7 {
        format!("{}d", age.num_days())
    } else {
        at.format("%B %d, %Y").to_string()
    }
}

pub fn header(profile: &ProfileView) -> String {
    let mut lines = vec![format!("{}{}", profile.name(), handle_suffix(profile))];
    if let Some(description) = profile.description.as_deref().filter(|d| !d.is_empty()) {
        lines.extend(description.lines().map(|line| format!("{INDENT}{line}")));
    }
    if let Some(url) = &profile.web_url {
        lines.push(format!("{INDENT}{url}"));
    }
    lines.join("\n")
}

pub fn item(view: &ItemView, now: DateTime<Utc>) -> String {
    let mut lines = Vec::new();
    match view {
        ItemView::Post(post) => push_thread(&mut lines, post, None, now),
        ItemView::Activity {
            verb,
            verbed_at,
            target,
        } => match target {
            Slot::Ready(post) => push_thread(&mut lines, post, Some((*verb, verbed_at)), now),
            Slot::Failed(message) => lines.push(error_line("Error fetching the post", message)),
        },
        ItemView::Relation {
            verb,
            verbed_at,
            target,
        } => match target {
            Slot::Ready(profile) => {
                lines.push(format!(
                    "{}{} ({verb} {})",
                    profile.name(),
                    handle_suffix(profile),
                    relative_date(verbed_at, now)
                ));
                if let Some(url) = &profile.web_url {
                    lines.push(format!("{INDENT}{url}"));
                }
            }
            Slot::Failed(message) => {
                lines.push(error_line("Error fetching the profile", message));
            }
        },
        ItemView::Profile(profile) => lines.push(header(profile)),
        ItemView::Error(message) => lines.push(error_line("Error fetching the post", message)),
    }
    lines.join("\n")
}

/// A reply is shown below its parent.
fn push_thread(
    lines: &mut Vec<String>,
    post: &PostView,
    verb: Option<(Verb, &String)>,
    now: DateTime<Utc>,
) {
    match post.parent.as_deref() {
        Some(Slot::Ready(parent)) => {
            push_post(lines, parent, None, 0, now);
            lines.push(format!("{INDENT}|"));
        }
        Some(Slot::Failed(message)) => {
            lines.push(error_line("Error fetching parent post", message));
        }
        None => {}
    }
    push_post(lines, post, verb, 0, now);
}

fn push_post(
    lines: &mut Vec<String>,
    post: &PostView,
    verb: Option<(Verb, &String)>,
    depth: usize,
    now: DateTime<Utc>,
) {
    let pad = INDENT.repeat(depth);
    let (name, handle) = match &post.author {
        Slot::Ready(author) => (author.name().to_string(), handle_suffix(author)),
        Slot::Failed(_) => (post.did.clone(), String::new()),
    };
    let mut date = relative_date(&post.created_at, now);
    if let Some((verb, at)) = verb {
        date = format!("{date} ({verb} {})", relative_date(at, now));
    }
    lines.push(format!("{pad}{name}{handle} · {date}"));

    lines.extend(post.text.lines().map(|line| format!("{pad}{INDENT}{line}")));
    for image in &post.images {
        lines.push(format!("{pad}{INDENT}[image] {} <{}>", image.alt, image.url));
    }
    if let Some(external) = &post.external {
        lines.push(format!("{pad}{INDENT}[link] {} <{}>", external.title, external.uri));
        if !external.description.is_empty() {
            lines.push(format!("{pad}{INDENT}{INDENT}{}", external.description));
        }
    }
    match post.quote.as_deref() {
        Some(Slot::Ready(quote)) => push_post(lines, quote, None, depth + 1, now),
        Some(Slot::Failed(message)) => lines.push(format!(
            "{pad}{INDENT}{}",
            error_line("Error fetching the quoted post", message)
        )),
        None => {}
    }
    if let Slot::Failed(message) = &post.author {
        lines.push(format!(
            "{pad}{INDENT}{}",
            error_line("Error fetching author's profile", message)
        ));
    }
    if let Some(url) = &post.web_url {
        lines.push(format!("{pad}{INDENT}{url}"));
    }
}

fn handle_suffix(profile: &ProfileView) -> String {
    match &profile.handle {
        Some(handle) if profile.name() != handle => format!(" @{handle}"),
        _ => String::new(),
    }
}

fn error_line(heading: &str, message: &str) -> String {
    format!("! {heading}: {message}")
}
