/// Format a `chrono::Duration` as `Nd HH:MM:SS.mmm`, used when logging
/// session and retry elapsed-time summaries.
pub fn format_duration(duration: &chrono::Duration) -> String {
    let milliseconds = format!("{:0>3}", duration.num_milliseconds() % 1000);
    let seconds = format!("{:0>2}", duration.num_seconds() % 60);
    let minutes = format!("{:0>2}", duration.num_minutes() % 60);
    let hours = format!("{:0>2}", duration.num_hours() % 24);
    let days = duration.num_days().to_string();

    format!("{days}d {hours}:{minutes}:{seconds}.{milliseconds}")
}
