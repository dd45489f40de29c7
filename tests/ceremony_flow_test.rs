// End-to-end registration and login ceremonies against the passkey service
use chrono::Duration;
use passgate::passkey::{ChallengeError, PasskeyError, PasskeyService};
use passgate::testing::fixtures::{
    test_passkey_service, test_passkey_service_with, TEST_ORIGIN, TEST_RP_ID,
};
use passgate::testing::{AttestationMode, SoftAuthenticator};
use passgate::webauthn::{Credential, UserVerificationRequirement, WebAuthnError, WebAuthnSettings};

const ALICE: &str = "alice@example.com";

fn register(
    service: &PasskeyService,
    username: &str,
    authenticator: &mut SoftAuthenticator,
) -> Result<Credential, PasskeyError> {
    let start = service.begin_registration(username)?;
    let response = authenticator.create(&start.options);
    service.finish_registration(username, &start.token, &response)
}

fn login(
    service: &PasskeyService,
    username: &str,
    authenticator: &mut SoftAuthenticator,
) -> Result<u32, PasskeyError> {
    let start = service.begin_login(username)?;
    let user_id = service.store().get_user(username)?.id;
    let response = authenticator.get(&start.options, Some(&user_id));
    service
        .finish_login(username, &start.token, &response)
        .map(|outcome| outcome.sign_count)
}

#[test]
fn test_alice_registers_and_logs_in() {
    let service = test_passkey_service();
    let mut authenticator = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);

    let start = service.begin_registration(ALICE).unwrap();
    let options = &start.options.public_key;
    assert_eq!(options.rp.id, "localhost");
    assert_eq!(options.rp.name, "Foobar Corp.");
    assert_eq!(options.user.name, ALICE);
    assert_eq!(options.user.display_name, "alice");
    assert_eq!(options.challenge.len(), 32);
    assert!(options.exclude_credentials.is_empty());

    let user = service.store().get_user(ALICE).unwrap();
    assert!(user.credentials.is_empty());
    assert_eq!(options.user.id.as_ref(), user.id.as_slice());

    let response = authenticator.create(&start.options);
    let credential = service
        .finish_registration(ALICE, &start.token, &response)
        .unwrap();
    assert_eq!(credential.credential_id, authenticator.credential_id());
    assert_eq!(credential.sign_count, 0);

    assert_eq!(login(&service, ALICE, &mut authenticator), Ok(1));
    assert_eq!(login(&service, ALICE, &mut authenticator), Ok(2));

    let stored = service.store().get_user(ALICE).unwrap();
    assert_eq!(stored.credentials.len(), 1);
    assert_eq!(stored.credentials[0].sign_count, 2);
    assert_eq!(service.challenges().pending(), 0);
}

#[test]
fn test_every_attestation_format_registers() {
    let service = test_passkey_service();
    for (index, mode) in [
        AttestationMode::None,
        AttestationMode::PackedSelf,
        AttestationMode::PackedBasic,
        AttestationMode::FidoU2f,
    ]
    .into_iter()
    .enumerate()
    {
        let mut authenticator = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN).with_attestation(mode);
        let username = format!("user{index}@example.com");
        let credential = register(&service, &username, &mut authenticator).unwrap();
        assert_eq!(credential.sign_count, 0);
        assert_eq!(login(&service, &username, &mut authenticator), Ok(1));
    }
}

#[test]
fn test_replayed_registration_finish_fails() {
    let service = test_passkey_service();
    let mut authenticator = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);

    let start = service.begin_registration(ALICE).unwrap();
    let response = authenticator.create(&start.options);
    service
        .finish_registration(ALICE, &start.token, &response)
        .unwrap();

    assert_eq!(
        service.finish_registration(ALICE, &start.token, &response),
        Err(PasskeyError::Challenge(ChallengeError::NotFound))
    );
    assert_eq!(service.store().get_user(ALICE).unwrap().credentials.len(), 1);
}

#[test]
fn test_replayed_login_finish_fails() {
    let service = test_passkey_service();
    let mut authenticator = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);
    register(&service, ALICE, &mut authenticator).unwrap();

    let start = service.begin_login(ALICE).unwrap();
    let response = authenticator.get(&start.options, None);
    service.finish_login(ALICE, &start.token, &response).unwrap();

    assert_eq!(
        service.finish_login(ALICE, &start.token, &response),
        Err(PasskeyError::Challenge(ChallengeError::NotFound))
    );

    // Same assertion against a freshly issued challenge
    let next = service.begin_login(ALICE).unwrap();
    assert_eq!(
        service.finish_login(ALICE, &next.token, &response),
        Err(PasskeyError::Verification(WebAuthnError::ChallengeMismatch))
    );
}

#[test]
fn test_only_issued_challenge_is_accepted() {
    let service = test_passkey_service();
    let mut authenticator = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);

    let first = service.begin_registration(ALICE).unwrap();
    let second = service.begin_registration(ALICE).unwrap();
    let response = authenticator.create(&first.options);

    assert_eq!(
        service.finish_registration(ALICE, &second.token, &response),
        Err(PasskeyError::Verification(WebAuthnError::ChallengeMismatch))
    );
    // The first session is still pending and still valid
    assert!(service
        .finish_registration(ALICE, &first.token, &response)
        .is_ok());
}

#[test]
fn test_failed_finish_burns_the_session() {
    let service = test_passkey_service();
    let mut authenticator = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);
    let start = service.begin_registration(ALICE).unwrap();

    authenticator.set_origin("https://evil.example");
    let forged = authenticator.create(&start.options);
    assert_eq!(
        service.finish_registration(ALICE, &start.token, &forged),
        Err(PasskeyError::Verification(WebAuthnError::OriginMismatch(
            "https://evil.example".to_string()
        )))
    );

    authenticator.set_origin(TEST_ORIGIN);
    let genuine = authenticator.create(&start.options);
    assert_eq!(
        service.finish_registration(ALICE, &start.token, &genuine),
        Err(PasskeyError::Challenge(ChallengeError::NotFound))
    );
}

#[test]
fn test_exclude_list_tracks_every_credential() {
    let service = test_passkey_service();
    let mut phone = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);
    let mut laptop = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);

    register(&service, ALICE, &mut phone).unwrap();
    register(&service, ALICE, &mut laptop).unwrap();

    let excluded = service.store().exclude_list(ALICE).unwrap();
    assert_eq!(excluded.len(), 2);
    assert!(excluded.contains(&phone.credential_id().to_vec()));
    assert!(excluded.contains(&laptop.credential_id().to_vec()));

    let start = service.begin_registration(ALICE).unwrap();
    let advertised: Vec<Vec<u8>> = start
        .options
        .public_key
        .exclude_credentials
        .iter()
        .map(|descriptor| descriptor.id.to_vec())
        .collect();
    assert_eq!(advertised.len(), 2);

    let response = phone.create(&start.options);
    assert_eq!(
        service.finish_registration(ALICE, &start.token, &response),
        Err(PasskeyError::DuplicateCredential)
    );
}

#[test]
fn test_credential_cannot_be_claimed_by_second_user() {
    let service = test_passkey_service();
    let mut authenticator = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);
    register(&service, ALICE, &mut authenticator).unwrap();

    assert_eq!(
        register(&service, "bob@example.com", &mut authenticator),
        Err(PasskeyError::DuplicateCredential)
    );
    assert!(service
        .store()
        .get_user("bob@example.com")
        .unwrap()
        .credentials
        .is_empty());
}

#[test]
fn test_counter_regression_is_rejected() {
    let service = test_passkey_service();
    let mut authenticator = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);
    register(&service, ALICE, &mut authenticator).unwrap();
    assert_eq!(login(&service, ALICE, &mut authenticator), Ok(1));
    assert_eq!(login(&service, ALICE, &mut authenticator), Ok(2));

    // A clone that lags behind the original
    authenticator.set_sign_count(1);
    assert_eq!(
        login(&service, ALICE, &mut authenticator),
        Err(PasskeyError::CounterRegression {
            stored: 2,
            received: 2
        })
    );
    assert_eq!(
        service.store().get_user(ALICE).unwrap().credentials[0].sign_count,
        2
    );
}

#[test]
fn test_authenticator_without_counter_keeps_working() {
    let service = test_passkey_service();
    let mut authenticator =
        SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN).with_counter_disabled();
    register(&service, ALICE, &mut authenticator).unwrap();

    for _ in 0..3 {
        assert_eq!(login(&service, ALICE, &mut authenticator), Ok(0));
    }
}

#[test]
fn test_unknown_user_login_issues_no_challenge() {
    let service = test_passkey_service();
    assert_eq!(
        service.begin_login("nobody@example.com").unwrap_err(),
        PasskeyError::UserNotFound("nobody@example.com".to_string())
    );
    assert_eq!(service.challenges().pending(), 0);
}

#[test]
fn test_expired_challenge_is_rejected() {
    let service = test_passkey_service_with(WebAuthnSettings::default(), Duration::zero());
    let mut authenticator = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);

    let start = service.begin_registration(ALICE).unwrap();
    let response = authenticator.create(&start.options);
    assert_eq!(
        service.finish_registration(ALICE, &start.token, &response),
        Err(PasskeyError::Challenge(ChallengeError::Expired))
    );
}

#[test]
fn test_login_token_cannot_finish_registration() {
    let service = test_passkey_service();
    let mut authenticator = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);
    register(&service, ALICE, &mut authenticator).unwrap();

    let login_start = service.begin_login(ALICE).unwrap();
    let registration_start = service.begin_registration(ALICE).unwrap();
    let response = authenticator.create(&registration_start.options);

    assert!(matches!(
        service.finish_registration(ALICE, &login_start.token, &response),
        Err(PasskeyError::Challenge(ChallengeError::KindMismatch { .. }))
    ));
}

#[test]
fn test_required_user_verification() {
    let settings = WebAuthnSettings {
        user_verification: UserVerificationRequirement::Required,
        ..WebAuthnSettings::default()
    };
    let service = test_passkey_service_with(settings, Duration::seconds(300));
    let mut presence_only =
        SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN).with_user_verification(false);

    assert_eq!(
        register(&service, ALICE, &mut presence_only),
        Err(PasskeyError::Verification(
            WebAuthnError::UserVerificationRequired
        ))
    );
}

#[test]
fn test_concurrent_begins_create_one_user() {
    let service = test_passkey_service();

    let user_ids: Vec<Vec<u8>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                scope.spawn(|| {
                    service
                        .begin_registration(ALICE)
                        .unwrap()
                        .options
                        .public_key
                        .user
                        .id
                        .to_vec()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let stored = service.store().get_user(ALICE).unwrap();
    assert!(user_ids.iter().all(|id| *id == stored.id));
    assert_eq!(service.challenges().pending(), 16);
}

#[test]
fn test_concurrent_registrations_for_one_user() {
    let service = test_passkey_service();
    service.begin_registration(ALICE).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let mut authenticator = SoftAuthenticator::new(TEST_RP_ID, TEST_ORIGIN);
                register(&service, ALICE, &mut authenticator).unwrap();
            });
        }
    });

    assert_eq!(service.store().exclude_list(ALICE).unwrap().len(), 8);
}
