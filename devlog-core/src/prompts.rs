//! Prompt text for every generation call the pipeline makes.

/// Fallback title when the model returns nothing usable and the commit has no headline.
pub const DEFAULT_TITLE: &str = "Default Blog Post Title";

/// Returns at most the last `max_chars` characters of `context`.
pub fn context_tail(context: &str, max_chars: usize) -> &str {
    let total = context.chars().count();
    if total <= max_chars {
        return context;
    }
    match context.char_indices().nth(total - max_chars) {
        Some((idx, _)) => &context[idx..],
        None => &context[context.len()..],
    }
}

/// Inputs shared by the post and secondary-summary prompts.
pub struct PostInputs<'a> {
    pub commit_message: &'a str,
    pub diff_summary: &'a str,
    pub note: &'a str,
}

pub fn blog_post(inputs: &PostInputs<'_>, prior_output: &str) -> String {
    let prior_section = if prior_output.trim().is_empty() {
        String::new()
    } else {
        format!(
            "\n**Previously Published Posts (do not repeat their explanations, build on them instead):**\n```\n{prior_output}\n```\n"
        )
    };
    format!(
        r#"You are a technical blogger and a software engineer.
Based on the following information, write a detailed and engaging blog post formatted as clean HTML (headings, paragraphs, lists and code blocks only; no <html>, <head> or <body> wrappers).

**Commit Message:**
```
{commit}
```

**Code Changes Summary:**
```
{diff}
```

**Additional Context (from notes, if any):**
```
{note}
```
{prior_section}
Your blog post should:
1.  Explain what was implemented, changed, or fixed in a clear and concise manner.
2.  Discuss why these changes are important, their impact, or how they fit into a larger project context.
3.  Maintain technical clarity and readability, suitable for a developer audience.
4.  Be approximately 300-500 words, structured with headings and bullet points where appropriate.
5.  Include a brief introduction and conclusion.
"#,
        commit = inputs.commit_message,
        diff = inputs.diff_summary,
        note = inputs.note,
    )
}

pub fn secondary_summary(inputs: &PostInputs<'_>) -> String {
    format!(
        r#"You are a professional content creator for LinkedIn.
Based on the following technical update, craft a concise (100-150 words) and impactful summary for a LinkedIn post.
Focus on the value and impact of the changes, suitable for a professional network.

**Commit Message:**
```
{commit}
```

**Code Changes Summary:**
```
{diff}
```

**Additional Context (from notes, if any):**
```
{note}
```

Include relevant keywords and a call to action if appropriate (e.g., "Learn more in my latest blog post").
"#,
        commit = inputs.commit_message,
        diff = inputs.diff_summary,
        note = inputs.note,
    )
}

pub fn title_candidates(commit_message: &str, post: &str) -> String {
    format!(
        r#"You are an expert in SEO and content marketing.
Based on the following commit message and blog post content, generate 3-5 highly click-worthy and SEO-friendly titles.
Prioritize titles that are engaging, informative, and include relevant keywords.

**Commit Message:**
```
{commit_message}
```

**Blog Post Content (for context):**
```
{post}
```

Provide only the titles, one per line, without any additional text or numbering.
"#
    )
}

pub fn diff_change_summary(filename: &str, status: &str, patch: &str) -> String {
    format!(
        r#"Summarize the following code change to `{filename}` ({status}) in at most five short bullet points.
Describe what changed and why it likely matters; skip formatting-only edits.

```diff
{patch}
```
"#
    )
}

pub fn diff_purpose_summary(filename: &str, patch: &str) -> String {
    format!(
        r#"The file `{filename}` was added as part of the initial commit of a repository.
In at most five short bullet points, describe the overall purpose of this file and the main pieces it provides.

```diff
{patch}
```
"#
    )
}

/// First usable title from a model response of one title per line.
///
/// List markers, numbering and surrounding quotes are stripped. Returns `None`
/// when no line has any text left.
pub fn pick_title(raw: &str) -> Option<String> {
    raw.lines()
        .map(clean_title_line)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

fn clean_title_line(line: &str) -> &str {
    let line = line.trim();
    let line = line.trim_start_matches(['-', '*', '•', '#']).trim_start();
    let line = match line.find(['.', ')']) {
        Some(idx) if idx > 0 && line[..idx].chars().all(|c| c.is_ascii_digit()) => {
            line[idx + 1..].trim_start()
        }
        _ => line,
    };
    line.trim_matches(|c| c == '"' || c == '\'' || c == '*').trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_title_skips_blank_lines_and_markers() {
        let raw = "\n\n1. \"Shipping OAuth2 Login in a Weekend\"\nAnother title\n";
        assert_eq!(pick_title(raw).as_deref(), Some("Shipping OAuth2 Login in a Weekend"));
        assert_eq!(pick_title("- **Bold Title**").as_deref(), Some("Bold Title"));
        assert_eq!(pick_title("  \n \n"), None);
    }

    #[test]
    fn pick_title_keeps_leading_numbers_that_are_not_list_markers() {
        assert_eq!(pick_title("10x Faster Builds").as_deref(), Some("10x Faster Builds"));
    }

    #[test]
    fn context_tail_keeps_suffix() {
        assert_eq!(context_tail("abcdef", 3), "def");
        assert_eq!(context_tail("abc", 10), "abc");
        assert_eq!(context_tail("héllo", 4), "éllo");
        assert_eq!(context_tail("abc", 0), "");
        assert_eq!(context_tail("", 0), "");
    }

    #[test]
    fn blog_prompt_mentions_prior_output_only_when_present() {
        let inputs = PostInputs {
            commit_message: "feat: add login",
            diff_summary: "File: auth.rs (added)",
            note: "",
        };
        assert!(!blog_post(&inputs, "").contains("Previously Published"));
        assert!(blog_post(&inputs, "earlier post").contains("earlier post"));
    }
}
