//! Noise_IK security mechanism.
//!
//! ```text
//! Noise_IK(s, rs):
//!   <- s                    # Acceptor's static key known to the initiator
//!   ...
//!   -> e, es, s, ss         # HELLO:  version, requested flags, initiator seed
//!   <- e, ee, se            # REPLY:  granted flags, acceptor seed
//! ```
//!
//! The target principal (`service@host`) is the Noise prologue, so both
//! sides must agree on it or the first message fails to decrypt.
//!
//! Both handshake payloads are encrypted by Noise. Session keys are
//! `HKDF-SHA256(salt = handshake_hash, ikm = seed_i || seed_a)`, expanded to
//! one key per direction.
//!
//! Wrap tokens:
//! ```text
//! sealed:  [0x01][seq BE (8)][ciphertext + tag]
//! signed:  [0x02][seq BE (8)][message][tag over header + message]
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use snow::{params::NoiseParams, Builder, HandshakeState};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use super::aead::{decrypt, encrypt, sign, verify, wrap_header, SessionKey, SESSION_KEY_SIZE};
use super::keys::{fingerprint, Keyring, StaticKeypair};
use super::nonce::{construct_nonce, Direction};
use crate::core::{
    SecurityError, AEAD_TAG_SIZE, HASH_SIZE, NOISE_PATTERN, PUBLIC_KEY_SIZE, WRAP_HEADER_SIZE, WRAP_KIND_SEALED,
    WRAP_KIND_SIGNED,
};
use crate::security::{
    AcceptorContext, ContextFlags, InitiatorContext, Mechanism, SealingContext, ServiceName, Step, UnsealingContext,
    Unwrapped,
};

/// HELLO payload version.
const HELLO_VERSION: u8 = 1;

/// Size of each side's key seed.
const SEED_SIZE: usize = 32;

/// HKDF info label for session keys.
const SESSION_KEY_LABEL: &[u8] = b"gssfwd v1 session keys";

/// Largest Noise message.
const MAX_NOISE_MESSAGE: usize = 65535;

/// Flags the Noise mechanism can always provide.
pub const NOISE_FLAGS: ContextFlags = ContextFlags::MUTUAL
    .with(ContextFlags::REPLAY)
    .with(ContextFlags::SEQUENCE)
    .with(ContextFlags::CONFIDENTIALITY)
    .with(ContextFlags::INTEGRITY);

type Seed = Zeroizing<[u8; SEED_SIZE]>;

fn random_seed() -> Seed {
    let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
    OsRng.fill_bytes(&mut seed[..]);
    seed
}

fn handshake_error(e: snow::Error) -> SecurityError {
    SecurityError::HandshakeFailed(e.to_string())
}

fn builder<'a>() -> Result<Builder<'a>, SecurityError> {
    let params: NoiseParams = NOISE_PATTERN.parse().map_err(handshake_error)?;
    Ok(Builder::new(params))
}

fn write_handshake(state: &mut HandshakeState, payload: &[u8]) -> Result<Vec<u8>, SecurityError> {
    let mut buf = vec![0u8; MAX_NOISE_MESSAGE];
    let len = state.write_message(payload, &mut buf).map_err(handshake_error)?;
    buf.truncate(len);
    Ok(buf)
}

fn read_handshake(state: &mut HandshakeState, message: &[u8]) -> Result<Zeroizing<Vec<u8>>, SecurityError> {
    let mut payload = Zeroizing::new(vec![0u8; MAX_NOISE_MESSAGE]);
    let len = state.read_message(message, &mut payload).map_err(handshake_error)?;
    payload.truncate(len);
    Ok(payload)
}

fn finished_hash(state: &HandshakeState) -> Result<[u8; HASH_SIZE], SecurityError> {
    if !state.is_handshake_finished() {
        return Err(SecurityError::HandshakeFailed("handshake not finished".into()));
    }
    let mut hash = [0u8; HASH_SIZE];
    hash.copy_from_slice(state.get_handshake_hash());
    Ok(hash)
}

/// Per-direction keys derived after the handshake.
pub struct SessionKeys {
    /// Key for initiator → acceptor tokens.
    pub initiator_key: SessionKey,
    /// Key for acceptor → initiator tokens.
    pub acceptor_key: SessionKey,
}

impl SessionKeys {
    /// Derive keys from both seeds, salted with the handshake hash.
    pub fn derive(
        handshake_hash: &[u8; HASH_SIZE],
        initiator_seed: &[u8; SEED_SIZE],
        acceptor_seed: &[u8; SEED_SIZE],
    ) -> Result<Self, SecurityError> {
        let mut ikm = Zeroizing::new([0u8; 2 * SEED_SIZE]);
        ikm[..SEED_SIZE].copy_from_slice(initiator_seed);
        ikm[SEED_SIZE..].copy_from_slice(acceptor_seed);

        let hk = Hkdf::<Sha256>::new(Some(&handshake_hash[..]), &ikm[..]);
        let mut okm = [0u8; 2 * SESSION_KEY_SIZE];
        hk.expand(SESSION_KEY_LABEL, &mut okm)
            .map_err(|_| SecurityError::HandshakeFailed("key derivation failed".into()))?;

        let mut initiator_key = [0u8; SESSION_KEY_SIZE];
        let mut acceptor_key = [0u8; SESSION_KEY_SIZE];
        initiator_key.copy_from_slice(&okm[..SESSION_KEY_SIZE]);
        acceptor_key.copy_from_slice(&okm[SESSION_KEY_SIZE..]);
        okm.zeroize();

        let keys = Self {
            initiator_key: SessionKey::from_bytes(initiator_key),
            acceptor_key: SessionKey::from_bytes(acceptor_key),
        };
        initiator_key.zeroize();
        acceptor_key.zeroize();
        Ok(keys)
    }
}

fn encode_hello(requested: ContextFlags, seed: &[u8; SEED_SIZE]) -> Zeroizing<Vec<u8>> {
    let mut payload = Zeroizing::new(Vec::with_capacity(2 + SEED_SIZE));
    payload.push(HELLO_VERSION);
    payload.push(requested.as_byte());
    payload.extend_from_slice(seed);
    payload
}

fn decode_hello(payload: &[u8]) -> Result<(ContextFlags, Seed), SecurityError> {
    match payload {
        [HELLO_VERSION, flags, rest @ ..] if rest.len() == SEED_SIZE => {
            let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
            seed.copy_from_slice(rest);
            Ok((ContextFlags::from_byte(*flags), seed))
        }
        [version, ..] if *version != HELLO_VERSION => Err(SecurityError::HandshakeFailed(format!(
            "unsupported hello version {version}"
        ))),
        _ => Err(SecurityError::HandshakeFailed("malformed hello".into())),
    }
}

fn encode_reply(granted: ContextFlags, seed: &[u8; SEED_SIZE]) -> Zeroizing<Vec<u8>> {
    let mut payload = Zeroizing::new(Vec::with_capacity(1 + SEED_SIZE));
    payload.push(granted.as_byte());
    payload.extend_from_slice(seed);
    payload
}

fn decode_reply(payload: &[u8]) -> Result<(ContextFlags, Seed), SecurityError> {
    match payload {
        [flags, rest @ ..] if rest.len() == SEED_SIZE => {
            let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
            seed.copy_from_slice(rest);
            Ok((ContextFlags::from_byte(*flags), seed))
        }
        _ => Err(SecurityError::HandshakeFailed("malformed reply".into())),
    }
}

fn seal_token(
    key: &SessionKey,
    direction: Direction,
    confidential: bool,
    sequence: u64,
    message: &[u8],
) -> Result<Vec<u8>, SecurityError> {
    let kind = if confidential { WRAP_KIND_SEALED } else { WRAP_KIND_SIGNED };
    let header = wrap_header(kind, sequence);
    let nonce = construct_nonce(direction, sequence);

    let mut token = Vec::with_capacity(WRAP_HEADER_SIZE + message.len() + AEAD_TAG_SIZE);
    token.extend_from_slice(&header);
    if confidential {
        token.extend_from_slice(&encrypt(key, &nonce, &header, message)?);
    } else {
        token.extend_from_slice(message);
        let tag = sign(key, &nonce, &token)?;
        token.extend_from_slice(&tag);
    }
    Ok(token)
}

fn open_token(key: &SessionKey, direction: Direction, expected: u64, token: &[u8]) -> Result<Unwrapped, SecurityError> {
    if token.len() < WRAP_HEADER_SIZE + AEAD_TAG_SIZE {
        return Err(SecurityError::MalformedToken);
    }
    let (header, body) = token.split_at(WRAP_HEADER_SIZE);
    let mut seq_bytes = [0u8; 8];
    seq_bytes.copy_from_slice(&header[1..]);
    let sequence = u64::from_be_bytes(seq_bytes);
    if sequence != expected {
        return Err(SecurityError::SequenceMismatch {
            expected,
            actual: sequence,
        });
    }

    let nonce = construct_nonce(direction, sequence);
    match header[0] {
        WRAP_KIND_SEALED => Ok(Unwrapped {
            message: decrypt(key, &nonce, header, body)?,
            confidential: true,
        }),
        WRAP_KIND_SIGNED => {
            let signed_len = token.len() - AEAD_TAG_SIZE;
            verify(key, &nonce, &token[..signed_len], &token[signed_len..])?;
            Ok(Unwrapped {
                message: token[WRAP_HEADER_SIZE..signed_len].to_vec(),
                confidential: false,
            })
        }
        _ => Err(SecurityError::MalformedToken),
    }
}

// ============================================================================
// Initiator
// ============================================================================

/// Noise_IK initiator mechanism.
#[derive(Debug, Clone)]
pub struct NoiseMechanism {
    keypair: Arc<StaticKeypair>,
    keyring: Arc<Keyring>,
}

impl NoiseMechanism {
    /// Create a mechanism with our identity and the acceptor keys we trust.
    pub fn new(keypair: StaticKeypair, keyring: Keyring) -> Self {
        Self {
            keypair: Arc::new(keypair),
            keyring: Arc::new(keyring),
        }
    }

    /// Our static public key.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        self.keypair.public_key()
    }
}

impl Mechanism for NoiseMechanism {
    type Initiator = NoiseInitiator;

    fn name(&self) -> &'static str {
        "noise-ik"
    }

    fn initiate(&self, target: &ServiceName, requested: ContextFlags) -> Result<NoiseInitiator, SecurityError> {
        let remote = self
            .keyring
            .get(target)
            .ok_or_else(|| SecurityError::UnknownPrincipal(target.to_string()))?;
        let prologue = target.to_string();

        let state = builder()?
            .local_private_key(self.keypair.private_key())
            .remote_public_key(remote)
            .prologue(prologue.as_bytes())
            .build_initiator()
            .map_err(handshake_error)?;

        debug!(%target, acceptor = %fingerprint(remote), "noise initiator created");
        Ok(NoiseInitiator {
            phase: InitiatorPhase::Start(Box::new(state)),
            requested,
            seed: random_seed(),
        })
    }
}

enum InitiatorPhase {
    Start(Box<HandshakeState>),
    AwaitingReply(Box<HandshakeState>),
    Complete { keys: SessionKeys, granted: ContextFlags },
    Failed,
}

/// Initiator context during the handshake.
pub struct NoiseInitiator {
    phase: InitiatorPhase,
    requested: ContextFlags,
    seed: Seed,
}

impl InitiatorContext for NoiseInitiator {
    type Sealer = NoiseSealer;

    fn step(&mut self, input: Option<&[u8]>) -> Result<Step, SecurityError> {
        match std::mem::replace(&mut self.phase, InitiatorPhase::Failed) {
            InitiatorPhase::Start(mut state) => {
                if input.is_some() {
                    return Err(SecurityError::HandshakeFailed("unexpected token before hello".into()));
                }
                let hello = write_handshake(&mut state, &encode_hello(self.requested, &self.seed))?;
                self.phase = InitiatorPhase::AwaitingReply(state);
                Ok(Step::Continue(hello))
            }
            InitiatorPhase::AwaitingReply(mut state) => {
                let reply = input.ok_or_else(|| SecurityError::HandshakeFailed("missing reply".into()))?;
                let payload = read_handshake(&mut state, reply)?;
                let (granted, acceptor_seed) = decode_reply(&payload)?;
                let hash = finished_hash(&state)?;
                let keys = SessionKeys::derive(&hash, &self.seed, &acceptor_seed)?;
                self.phase = InitiatorPhase::Complete { keys, granted };
                Ok(Step::Complete(Vec::new()))
            }
            InitiatorPhase::Complete { .. } | InitiatorPhase::Failed => {
                Err(SecurityError::HandshakeFailed("negotiation already finished".into()))
            }
        }
    }

    fn into_established(self) -> Result<NoiseSealer, SecurityError> {
        match self.phase {
            InitiatorPhase::Complete { keys, granted } => Ok(NoiseSealer {
                key: keys.initiator_key,
                granted,
                next_sequence: 0,
            }),
            _ => Err(SecurityError::HandshakeFailed("negotiation incomplete".into())),
        }
    }
}

/// Established initiator context.
pub struct NoiseSealer {
    key: SessionKey,
    granted: ContextFlags,
    next_sequence: u64,
}

impl NoiseSealer {
    /// Sequence number the next token will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}

impl SealingContext for NoiseSealer {
    fn flags(&self) -> ContextFlags {
        self.granted
    }

    fn wrap(&mut self, confidential: bool, message: &[u8]) -> Result<Vec<u8>, SecurityError> {
        let sequence = self.next_sequence;
        let next = sequence.checked_add(1).ok_or(SecurityError::WrapFailed)?;
        let token = seal_token(&self.key, Direction::InitiatorToAcceptor, confidential, sequence, message)?;
        self.next_sequence = next;
        Ok(token)
    }
}

impl fmt::Debug for NoiseSealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseSealer")
            .field("granted", &self.granted)
            .field("next_sequence", &self.next_sequence)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Acceptor
// ============================================================================

/// Receiving-side credentials; hands out one [`NoiseAcceptor`] per connection.
#[derive(Debug, Clone)]
pub struct NoiseResponder {
    keypair: Arc<StaticKeypair>,
    principal: ServiceName,
    authorized: Option<Arc<HashSet<[u8; PUBLIC_KEY_SIZE]>>>,
}

impl NoiseResponder {
    /// Accept contexts for `principal` with our static keypair.
    ///
    /// Any initiator key is accepted until [`NoiseResponder::authorize`] is used.
    pub fn new(keypair: StaticKeypair, principal: ServiceName) -> Self {
        Self {
            keypair: Arc::new(keypair),
            principal,
            authorized: None,
        }
    }

    /// Restrict accepted initiators; may be called repeatedly.
    pub fn authorize(mut self, initiator: [u8; PUBLIC_KEY_SIZE]) -> Self {
        let mut keys = self.authorized.as_deref().cloned().unwrap_or_default();
        keys.insert(initiator);
        self.authorized = Some(Arc::new(keys));
        self
    }

    /// Our static public key.
    pub fn public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        self.keypair.public_key()
    }

    /// Principal served.
    pub fn principal(&self) -> &ServiceName {
        &self.principal
    }

    /// Create a context for one inbound connection.
    pub fn acceptor(&self) -> Result<NoiseAcceptor, SecurityError> {
        let prologue = self.principal.to_string();
        let state = builder()?
            .local_private_key(self.keypair.private_key())
            .prologue(prologue.as_bytes())
            .build_responder()
            .map_err(handshake_error)?;

        Ok(NoiseAcceptor {
            phase: AcceptorPhase::AwaitingHello(Box::new(state)),
            authorized: self.authorized.clone(),
        })
    }
}

enum AcceptorPhase {
    AwaitingHello(Box<HandshakeState>),
    Complete {
        keys: SessionKeys,
        granted: ContextFlags,
        peer: [u8; PUBLIC_KEY_SIZE],
    },
    Failed,
}

/// Acceptor context during the handshake.
pub struct NoiseAcceptor {
    phase: AcceptorPhase,
    authorized: Option<Arc<HashSet<[u8; PUBLIC_KEY_SIZE]>>>,
}

impl AcceptorContext for NoiseAcceptor {
    type Unsealer = NoiseUnsealer;

    fn step(&mut self, input: &[u8]) -> Result<Step, SecurityError> {
        let AcceptorPhase::AwaitingHello(mut state) = std::mem::replace(&mut self.phase, AcceptorPhase::Failed) else {
            return Err(SecurityError::HandshakeFailed("negotiation already finished".into()));
        };

        let payload = read_handshake(&mut state, input)?;
        let (requested, initiator_seed) = decode_hello(&payload)?;

        let mut peer = [0u8; PUBLIC_KEY_SIZE];
        peer.copy_from_slice(
            state
                .get_remote_static()
                .ok_or_else(|| SecurityError::HandshakeFailed("no remote static key".into()))?,
        );
        if let Some(authorized) = &self.authorized {
            if !authorized.contains(&peer) {
                debug!(initiator = %fingerprint(&peer), "initiator key not authorized");
                return Err(SecurityError::Unauthorized);
            }
        }

        let acceptor_seed = random_seed();
        let reply = write_handshake(&mut state, &encode_reply(NOISE_FLAGS, &acceptor_seed))?;
        let hash = finished_hash(&state)?;
        let keys = SessionKeys::derive(&hash, &initiator_seed, &acceptor_seed)?;

        debug!(initiator = %fingerprint(&peer), %requested, "noise handshake answered");
        self.phase = AcceptorPhase::Complete {
            keys,
            granted: NOISE_FLAGS,
            peer,
        };
        Ok(Step::Complete(reply))
    }

    fn into_established(self) -> Result<NoiseUnsealer, SecurityError> {
        match self.phase {
            AcceptorPhase::Complete { keys, granted, peer } => Ok(NoiseUnsealer {
                key: keys.initiator_key,
                granted,
                peer,
                expected_sequence: 0,
            }),
            _ => Err(SecurityError::HandshakeFailed("negotiation incomplete".into())),
        }
    }
}

/// Established acceptor context.
pub struct NoiseUnsealer {
    key: SessionKey,
    granted: ContextFlags,
    peer: [u8; PUBLIC_KEY_SIZE],
    expected_sequence: u64,
}

impl NoiseUnsealer {
    /// Static public key of the authenticated initiator.
    pub fn peer_public_key(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.peer
    }
}

impl UnsealingContext for NoiseUnsealer {
    fn flags(&self) -> ContextFlags {
        self.granted
    }

    fn unwrap_token(&mut self, token: &[u8]) -> Result<Unwrapped, SecurityError> {
        let unwrapped = open_token(&self.key, Direction::InitiatorToAcceptor, self.expected_sequence, token)?;
        self.expected_sequence = self.expected_sequence.saturating_add(1);
        Ok(unwrapped)
    }
}

impl fmt::Debug for NoiseUnsealer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoiseUnsealer")
            .field("granted", &self.granted)
            .field("peer", &fingerprint(&self.peer))
            .field("expected_sequence", &self.expected_sequence)
            .finish_non_exhaustive()
    }
}
