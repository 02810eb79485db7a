fn main() {
    println!("Run `cargo test -p tool-contract` to execute the tool contract tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use linshare_client::{FlowChunkResponse, FlowStatus, Quota};
    use linshare_protocol::constants::{self, Method};
    use linshare_protocol::messages::{
        FinalizeUploadArgs, UploadChunkArgs, UploadLocalFileArgs,
    };
    use linshare_protocol::{
        CallToolParams, CallToolResult, InitializeParams, InitializeResult, Request, RequestId,
        Response,
    };

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture as raw text.
    fn fixture_text(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&fixture_text(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture, re-serializes it and compares the JSON values.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  ours:    {reserialized}"
        );
        parsed
    }

    // --- Lifecycle ---

    #[test]
    fn fixture_initialize_request() {
        let req: Request = serde_json::from_str(&fixture_text("initialize_request.json")).unwrap();
        assert_eq!(req.id, Some(RequestId::Number(0)));
        assert_eq!(Method::from_name(&req.method), Some(Method::Initialize));

        let params: InitializeParams = req.parse_params().unwrap().unwrap();
        assert_eq!(
            constants::negotiate_protocol_version(&params.protocol_version),
            "2025-06-18"
        );
        assert_eq!(params.client_info.unwrap().name, "linshare-chat-client");
    }

    #[test]
    fn fixture_initialize_result() {
        let result: InitializeResult = roundtrip_test("initialize_result.json");
        assert!(result.capabilities.tools.is_some());
        assert_eq!(result.server_info.name, "linshare-mcp");
    }

    // --- Tool calls ---

    #[test]
    fn fixture_tools_call_upload_chunk() {
        let req: Request =
            serde_json::from_str(&fixture_text("tools_call_upload_chunk.json")).unwrap();
        assert_eq!(req.id, Some(RequestId::String("msg-42".into())));
        assert_eq!(Method::from_name(&req.method), Some(Method::ToolsCall));

        let call: CallToolParams = req.parse_params().unwrap().unwrap();
        assert_eq!(call.name, "user_remote_upload_by_chunks");

        let args: UploadChunkArgs = serde_json::from_value(call.arguments).unwrap();
        assert_eq!(args.filename, "quarterly report.pdf");
        assert_eq!(args.session_key(), "msg-42");
        // Last index of the declared total closes the sequence.
        assert!(args.is_final());
    }

    #[test]
    fn fixture_upload_chunk_args_full() {
        let args: UploadChunkArgs = roundtrip_test("upload_chunk_args_full.json");
        assert!(args.is_final());
        assert!(args.workgroup_uuid.is_some());
    }

    #[test]
    fn fixture_finalize_upload_args() {
        let args: FinalizeUploadArgs = roundtrip_test("finalize_upload_args.json");
        assert_eq!(args.session_id, "s-1");
        assert!(args.folder_uuid.is_none());
    }

    #[test]
    fn fixture_upload_local_file_args() {
        let args: UploadLocalFileArgs = roundtrip_test("upload_local_file_args.json");
        assert!(!args.async_task);

        let defaulted: UploadLocalFileArgs =
            serde_json::from_str(r#"{"filename":"report.pdf"}"#).unwrap();
        assert!(defaulted.async_task);
    }

    #[test]
    fn fixture_call_tool_result_error() {
        let result: CallToolResult = roundtrip_test("call_tool_result_error.json");
        assert!(result.is_error);
        assert!(result.joined_text().contains("missing 1 chunk(s)"));
    }

    // --- Error replies ---

    #[test]
    fn fixture_error_response() {
        let resp: Response = serde_json::from_str(&fixture_text("error_response.json")).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, constants::METHOD_NOT_FOUND);
        assert!(resp.result.is_none());

        let ours = Response::error(Some(RequestId::Number(7)), err.code, err.message);
        assert_eq!(
            serde_json::to_value(&ours).unwrap(),
            load_fixture("error_response.json")
        );
    }

    #[test]
    fn fixture_parse_error_response() {
        let ours = Response::parse_error("parse error");
        assert_eq!(
            serde_json::to_value(&ours).unwrap(),
            load_fixture("parse_error_response.json")
        );
    }

    // --- LinShare replies ---

    #[test]
    fn fixture_flow_chunk_last() {
        let reply: FlowChunkResponse =
            serde_json::from_value(load_fixture("flow_chunk_last.json")).unwrap();
        assert!(reply.last_chunk);
        assert_eq!(reply.chunk_upload_success, Some(true));
        assert!(reply.uuid.is_some());
    }

    #[test]
    fn fixture_flow_status_error() {
        let status: FlowStatus =
            serde_json::from_value(load_fixture("flow_status_error.json")).unwrap();
        assert!(!status.is_success());
        assert!(!status.is_processing());
        assert_eq!(status.error_msg.as_deref(), Some("The file is too large"));
    }

    #[test]
    fn fixture_quota() {
        let quota: Quota = serde_json::from_value(load_fixture("quota.json")).unwrap();
        assert_eq!(quota.available(), 1_073_741_824 - 1_048_576);
        assert_eq!(quota.max_file_size, Some(104_857_600));
    }
}
