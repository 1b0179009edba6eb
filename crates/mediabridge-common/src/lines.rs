//! Splitting accumulated engine output into discrete lines.

/// Split output chunks into lines.
///
/// Chunks are concatenated in order before splitting, so a line broken across
/// two chunks is reassembled. Chunks that do not end in a newline are treated
/// as complete lines, which matches engines that emit one message per printed
/// line. Carriage returns used for in-place progress updates are treated as
/// line breaks, and empty lines are dropped.
///
/// # Examples
///
/// ```
/// use mediabridge_common::lines::split_lines;
///
/// let lines = split_lines(["frame=1\rframe=2\n", "done"]);
/// assert_eq!(lines, vec!["frame=1", "frame=2", "done"]);
/// ```
pub fn split_lines<I, S>(chunks: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut text = String::new();
    for chunk in chunks {
        let chunk = chunk.as_ref();
        text.push_str(chunk);
        if !chunk.ends_with('\n') {
            text.push('\n');
        }
    }

    text.split(['\n', '\r'])
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.to_string())
        .collect()
}
