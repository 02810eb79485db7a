pub(crate) mod mime;
pub(crate) mod paths;

pub(crate) use mime::guess_mime_type;
pub(crate) use paths::expand_path;
