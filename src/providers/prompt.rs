use chrono::NaiveDate;

const INTEGRITY_CLAUSE: &str = "Answer the user's questions helpfully and accurately. \
If you don't have access to real-time information or are uncertain about something, say so clearly. \
Never fabricate specific facts, statistics, URLs, or citations.";

/// 人类可读日期，例如 "Monday, January 1, 2024"
pub fn format_date(date: NaiveDate) -> String {
    date.format("%A, %B %-d, %Y").to_string()
}

/// 构建系统指令：模型身份、当前日期、可选能力声明、事实完整性条款
pub fn system_message(
    model_name: &str,
    capability_note: Option<&str>,
    today: NaiveDate,
) -> String {
    let mut prompt = format!(
        "You are {}. Today's date is {}.",
        model_name,
        format_date(today)
    );

    if let Some(note) = capability_note {
        prompt.push(' ');
        prompt.push_str(note);
    }

    prompt.push(' ');
    prompt.push_str(INTEGRITY_CLAUSE);
    prompt
}
