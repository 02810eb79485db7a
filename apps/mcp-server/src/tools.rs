//! Tool catalogue advertised by `tools/list`.

use linshare_protocol::ToolDescriptor;
use serde_json::{Value, json};

pub const UPLOAD_BY_CHUNKS: &str = "user_remote_upload_by_chunks";
pub const FINALIZE_UPLOAD: &str = "finalize_chunked_upload";
pub const LIST_UPLOAD_SESSIONS: &str = "list_upload_sessions";
pub const LIST_UPLOAD_FILES: &str = "list_upload_files";
pub const GET_DIRECTORY_INFO: &str = "get_directory_info";
pub const UPLOAD_LOCAL_FILE: &str = "upload_file_from_local_directory";

fn destination_properties() -> Value {
    json!({
        "workgroup_uuid": {
            "type": "string",
            "description": "Workgroup to upload into; personal space when omitted"
        },
        "folder_uuid": {
            "type": "string",
            "description": "Folder inside the workgroup; workgroup root when omitted"
        }
    })
}

fn object_schema(mut properties: Value, required: &[&str]) -> Value {
    if let (Some(props), Value::Object(extra)) =
        (properties.as_object_mut(), destination_properties())
    {
        for (key, value) in extra {
            props.entry(key).or_insert(value);
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn no_arguments() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// All tools served.
pub fn catalogue() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: UPLOAD_BY_CHUNKS.into(),
            description: "Upload a file to LinShare as a sequence of base64 chunks. Chunks may \
                          arrive in any order; the file is assembled and sent to LinShare when \
                          the final chunk completes the sequence."
                .into(),
            input_schema: object_schema(
                json!({
                    "filename": { "type": "string", "description": "Name of the assembled file" },
                    "chunk_index": { "type": "integer", "minimum": 0, "description": "Zero-based chunk position" },
                    "data_b64": { "type": "string", "description": "Base64-encoded chunk bytes" },
                    "session_id": { "type": "string", "description": "Upload session id; defaults to the filename" },
                    "total_chunks": { "type": "integer", "minimum": 1 },
                    "is_final": { "type": "boolean", "description": "Marks the last chunk" }
                }),
                &["filename", "chunk_index", "data_b64"],
            ),
        },
        ToolDescriptor {
            name: FINALIZE_UPLOAD.into(),
            description: "Assemble a chunked upload whose chunks have all arrived and send it \
                          to LinShare."
                .into(),
            input_schema: object_schema(
                json!({ "session_id": { "type": "string" } }),
                &["session_id"],
            ),
        },
        ToolDescriptor {
            name: LIST_UPLOAD_SESSIONS.into(),
            description: "List in-flight and completed chunked upload sessions.".into(),
            input_schema: no_arguments(),
        },
        ToolDescriptor {
            name: LIST_UPLOAD_FILES.into(),
            description: "List the files in the upload directory available for uploading."
                .into(),
            input_schema: no_arguments(),
        },
        ToolDescriptor {
            name: GET_DIRECTORY_INFO.into(),
            description: "Show the upload and download directory configuration and status."
                .into(),
            input_schema: no_arguments(),
        },
        ToolDescriptor {
            name: UPLOAD_LOCAL_FILE.into(),
            description: "Upload a file from the upload directory to LinShare using Flow.js \
                          chunked upload."
                .into(),
            input_schema: object_schema(
                json!({
                    "filename": { "type": "string", "description": "Name of a file in the upload directory" },
                    "async_task": { "type": "boolean", "default": true, "description": "Let LinShare process the document asynchronously" }
                }),
                &["filename"],
            ),
        },
    ]
}
