//! Integration tests for failure classification.

use veritext_upload::{
    FailureClass, RestError, StreamError, UploadError, classify_rest_error,
    classify_upload_error,
};

#[test]
fn upload_error_classification_tests_distinguish_transient_and_permanent() {
    assert_eq!(
        classify_rest_error(&RestError::Server {
            status: 503,
            message: "busy".to_string(),
        }),
        FailureClass::Recoverable
    );
    assert_eq!(
        classify_rest_error(&RestError::Transport("reset".to_string())),
        FailureClass::Recoverable
    );
    assert_eq!(
        classify_rest_error(&RestError::Client {
            status: 400,
            message: "bad zip".to_string(),
        }),
        FailureClass::Fatal
    );
    assert_eq!(
        classify_rest_error(&RestError::Validation("empty name".to_string())),
        FailureClass::Fatal
    );
}

#[test]
fn upload_error_classification_tests_streaming_path_is_terminal_except_malformed() {
    let contract_error = veritext_contract::parse_upload_message("not json")
        .expect_err("non-JSON frame must not parse");
    assert_eq!(
        classify_upload_error(&UploadError::Contract(contract_error)),
        FailureClass::Recoverable
    );

    assert_eq!(
        classify_upload_error(&UploadError::Stream(StreamError::Connect(
            "refused".to_string()
        ))),
        FailureClass::Fatal
    );
    assert_eq!(
        classify_upload_error(&UploadError::ConnectionClosed),
        FailureClass::Fatal
    );
    assert_eq!(
        classify_upload_error(&UploadError::ServerFailure("disk full".to_string())),
        FailureClass::Fatal
    );
}
