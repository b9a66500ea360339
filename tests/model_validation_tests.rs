use bloggy::{
    models::{AuthRecord, CommentForm, FormErrors, PostForm, RegistrationForm, User},
    views::FieldKind,
};
use std::collections::BTreeSet;

// --- Serialization ---

#[test]
fn test_user_json_never_carries_credentials() {
    let user = User {
        id: 1,
        email: "ann@example.com".to_string(),
        first_name: "Ann".to_string(),
        last_name: "Reader".to_string(),
        auth: AuthRecord {
            password_hash: "$argon2id$secret-hash".to_string(),
            registration_key: Some("pending-key".to_string()),
            groups: BTreeSet::from(["admin".to_string()]),
        },
    };

    let json = serde_json::to_string(&user).unwrap();
    assert!(json.contains("\"email\":\"ann@example.com\""));
    assert!(!json.contains("argon2"));
    assert!(!json.contains("pending-key"));
    assert!(!json.contains("password"));
}

#[test]
fn test_form_errors_serialize_as_flat_map() {
    let mut errors = FormErrors::single("text", "cannot be empty");
    errors.insert("title", "must be at most 255 characters");

    let value = serde_json::to_value(&errors).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "text": "cannot be empty",
            "title": "must be at most 255 characters"
        })
    );
}

#[test]
fn test_field_kind_is_lowercase() {
    let value = serde_json::to_value(FieldKind::Password).unwrap();
    assert_eq!(value, "password");
}

// --- Form Deserialization ---

#[test]
fn test_post_form_drops_server_owned_fields() {
    let form: PostForm = serde_json::from_value(serde_json::json!({
        "title": "T",
        "text": "B",
        "user": 5,
        "date": "yesterday",
        "id": 3
    }))
    .unwrap();
    assert_eq!(form.title, "T");
    assert_eq!(form.text, "B");
}

#[test]
fn test_comment_form_tolerates_missing_fields() {
    let form: CommentForm = serde_json::from_str("{}").unwrap();
    assert!(form.text.is_empty());
    assert!(form.post.is_none());
}

// --- Validation ---

#[test]
fn test_registration_form_accepts_valid_input() {
    let form = RegistrationForm {
        email: "ann@example.com".to_string(),
        first_name: "Ann".to_string(),
        last_name: "Reader".to_string(),
        password: "password1".to_string(),
        password2: "password1".to_string(),
    };
    assert!(form.check().is_ok());
}
