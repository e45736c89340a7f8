use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

const MAX_FILENAME_LEN: usize = 100;
const TRUNCATED_SUMMARY_LEN: usize = 30;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// First three words of the hook, camelCased.
pub fn hook_summary(hook_text: &str) -> String {
    let cleaned = NON_WORD.replace_all(hook_text, "");
    let words: Vec<&str> = cleaned.split_whitespace().take(3).collect();
    if words.is_empty() {
        return "emptyHook".to_string();
    }

    let mut out = words[0].to_lowercase();
    for word in &words[1..] {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    out
}

pub struct FilenameParts<'a> {
    pub date: NaiveDate,
    pub project: &'a str,
    pub number: u32,
    pub hook_id: i64,
    pub hook_text: &'a str,
    pub hook_video_stem: &'a str,
    pub cta_count: usize,
}

/// `YYYYMMDD_<project>_<NNN>_h<id>_<summary>_<hookvideo>_<k>cta.mp4`
pub fn descriptive_filename(parts: &FilenameParts<'_>) -> String {
    let video = WHITESPACE.replace_all(parts.hook_video_stem, "_");
    let date = parts.date.format("%Y%m%d").to_string();
    let build = |summary: &str| {
        format!(
            "{}_{}_{:03}_h{}_{}_{}_{}cta.mp4",
            date, parts.project, parts.number, parts.hook_id, summary, video, parts.cta_count
        )
    };

    let summary = hook_summary(parts.hook_text);
    let name = build(&summary);
    if name.len() <= MAX_FILENAME_LEN {
        return name;
    }
    let short: String = summary.chars().take(TRUNCATED_SUMMARY_LEN).collect();
    build(&short)
}
