/// Guesses a MIME type from the file extension.
pub(crate) fn guess_mime_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}
