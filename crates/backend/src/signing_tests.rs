use super::*;
use chrono::Duration as ChronoDuration;
use rsa::RsaPrivateKey;
use tyger_core::BufferId;

fn keypair() -> RsaPrivateKey {
    let mut rng = rsa::rand_core::OsRng;
    RsaPrivateKey::new(&mut rng, 2048).unwrap()
}

#[test]
fn signature_verifies_under_primary_key() {
    let primary = keypair();
    let service = SigningService::new(primary, None);
    let now = Utc::now();
    let buffer_id = BufferId::new("inputs".to_string());

    let query = service
        .sign_sas_query_string(&buffer_id, ResourceType::Blob, SasAction::READ, ChronoDuration::minutes(5), now)
        .unwrap();

    let fields = service.verify(&query, now).unwrap();
    assert_eq!(fields.buffer_id, "inputs");
    assert!(fields.actions.contains(SasAction::READ));
}

#[test]
fn signature_verifies_under_secondary_key_when_configured() {
    let primary = keypair();
    let secondary = keypair();
    let secondary_public = RsaPublicKey::from(&secondary);

    let signer_using_secondary = SigningService::new(secondary, None);
    let verifier = SigningService::new(primary, Some(secondary_public));

    let now = Utc::now();
    let buffer_id = BufferId::new("outputs".to_string());
    let query = signer_using_secondary
        .sign_sas_query_string(&buffer_id, ResourceType::Blob, SasAction::CREATE, ChronoDuration::minutes(5), now)
        .unwrap();

    assert!(verifier.verify(&query, now).is_ok());
}

#[test]
fn expired_query_string_fails_verification() {
    let primary = keypair();
    let service = SigningService::new(primary, None);
    let now = Utc::now();
    let buffer_id = BufferId::new("inputs".to_string());

    let query = service
        .sign_sas_query_string(&buffer_id, ResourceType::Blob, SasAction::READ, ChronoDuration::seconds(-1), now)
        .unwrap();

    let err = service.verify(&query, now).unwrap_err();
    assert!(matches!(err, SigningError::Invalid));
}

#[test]
fn tampered_buffer_id_fails_verification() {
    let primary = keypair();
    let service = SigningService::new(primary, None);
    let now = Utc::now();
    let buffer_id = BufferId::new("inputs".to_string());

    let query = service
        .sign_sas_query_string(&buffer_id, ResourceType::Blob, SasAction::READ, ChronoDuration::minutes(5), now)
        .unwrap();
    let tampered = query.replacen("bufferId=inputs", "bufferId=outputs", 1);

    let err = service.verify(&tampered, now).unwrap_err();
    assert!(matches!(err, SigningError::Invalid));
}

#[test]
fn unconfigured_secondary_key_does_not_verify_foreign_signature() {
    let primary = keypair();
    let stranger = keypair();
    let service = SigningService::new(primary, None);
    let attacker = SigningService::new(stranger, None);

    let now = Utc::now();
    let buffer_id = BufferId::new("inputs".to_string());
    let query = attacker
        .sign_sas_query_string(&buffer_id, ResourceType::Blob, SasAction::READ, ChronoDuration::minutes(5), now)
        .unwrap();

    assert!(service.verify(&query, now).is_err());
}
