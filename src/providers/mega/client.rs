//! Minimal client for the MEGA web API (`/cs` command endpoint),
//! covering the subset the relay needs: login, file upload and public
//! link export. Commands are JSON arrays POSTed with a monotonically
//! increasing `id`; a bare negative integer anywhere in the response is
//! a MEGA error code.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use rand::{Rng, RngCore};
use rand::distributions::Alphanumeric;
use reqwest::Client;
use serde_json::{Value, json};
use sha2::Sha512;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use super::crypto::{
    a32_to_bytes, b64url_decode, b64url_encode, bytes_to_a32, chunk_sizes, decrypt_key,
    encrypt_attributes, encrypt_key, prepare_key_v1, read_mpi, stringhash,
};
use crate::providers::ProviderError;

const API_ORIGIN: &str = "https://g.api.mega.co.nz";
const LINK_ORIGIN: &str = "https://mega.nz";

/// PBKDF2-HMAC-SHA512 rounds for v2 accounts, fixed by the protocol.
const V2_PBKDF2_ROUNDS: u32 = 100_000;

/// Retries for the server's transient "try again" (-3) answer.
const EAGAIN_ATTEMPTS: u32 = 3;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// An authenticated MEGA session: session id, master key and the cloud
/// drive root handle. Built once per process and shared across
/// requests; only the command sequence counter mutates afterwards.
pub struct MegaSession {
    http: Client,
    sid: String,
    master_key: [u8; 16],
    root_handle: String,
    seq: AtomicU64,
}

impl MegaSession {
    /// Performs the login handshake and resolves the cloud drive root.
    pub async fn login(
        http: Client,
        email: &str,
        password: &str,
    ) -> Result<MegaSession, ProviderError> {
        let email = email.trim().to_ascii_lowercase();
        let seq = AtomicU64::new(rand::thread_rng().next_u32() as u64);

        let prelogin =
            api_request(&http, &seq, None, json!({ "a": "us0", "user": email })).await?;

        let (password_key, user_hash) = match prelogin.get("v").and_then(Value::as_i64) {
            Some(2) => {
                let salt = prelogin
                    .get("s")
                    .and_then(Value::as_str)
                    .and_then(b64url_decode)
                    .ok_or_else(|| protocol("prelogin response missing salt"))?;
                let mut derived = [0u8; 32];
                pbkdf2::pbkdf2_hmac::<Sha512>(
                    password.as_bytes(),
                    &salt,
                    V2_PBKDF2_ROUNDS,
                    &mut derived,
                );
                let mut key = [0u8; 16];
                key.copy_from_slice(&derived[..16]);
                (key, b64url_encode(&derived[16..]))
            }
            _ => {
                // v1 account: iterated-AES key derivation
                let key = prepare_key_v1(password.as_bytes());
                let hash = stringhash(&email, &key);
                (key, hash)
            }
        };

        let login = api_request(
            &http,
            &seq,
            None,
            json!({ "a": "us", "user": email, "uh": user_hash }),
        )
        .await?;

        let wrapped_master = login
            .get("k")
            .and_then(Value::as_str)
            .and_then(b64url_decode)
            .ok_or_else(|| protocol("login response missing master key"))?;
        let unwrapped = decrypt_key(&wrapped_master, &password_key);
        if unwrapped.len() < 16 {
            return Err(protocol("master key too short"));
        }
        let mut master_key = [0u8; 16];
        master_key.copy_from_slice(&unwrapped[..16]);

        let sid = match login.get("tsid").and_then(Value::as_str) {
            // temporary session ids are used verbatim
            Some(tsid) => tsid.to_string(),
            None => {
                let privk = login
                    .get("privk")
                    .and_then(Value::as_str)
                    .and_then(b64url_decode)
                    .ok_or_else(|| protocol("login response missing private key"))?;
                let csid = login
                    .get("csid")
                    .and_then(Value::as_str)
                    .and_then(b64url_decode)
                    .ok_or_else(|| protocol("login response missing session id"))?;
                decrypt_session_id(&decrypt_key(&privk, &master_key), &csid)?
            }
        };

        let files = api_request(&http, &seq, Some(&sid), json!({ "a": "f", "c": 1 })).await?;
        let root_handle = files
            .get("f")
            .and_then(Value::as_array)
            .and_then(|nodes| {
                nodes
                    .iter()
                    .find(|node| node.get("t").and_then(Value::as_i64) == Some(2))
            })
            .and_then(|node| node.get("h").and_then(Value::as_str))
            .ok_or_else(|| protocol("cloud drive root not found"))?
            .to_string();

        info!("MEGA session established");
        Ok(MegaSession {
            http,
            sid,
            master_key,
            root_handle,
            seq,
        })
    }

    async fn request(&self, cmd: Value) -> Result<Value, ProviderError> {
        api_request(&self.http, &self.seq, Some(&self.sid), cmd).await
    }

    /// Encrypts and uploads the staged file, commits the node under the
    /// cloud drive root and returns a public `mega.nz` link.
    pub async fn upload_file(
        &self,
        path: &Path,
        filename: &str,
    ) -> Result<String, ProviderError> {
        let size = tokio::fs::metadata(path).await?.len();

        let upload = self.request(json!({ "a": "u", "s": size })).await?;
        let upload_url = upload
            .get("p")
            .and_then(Value::as_str)
            .ok_or_else(|| protocol("upload URL missing"))?
            .to_string();

        // 6 random words: 4 for the file key, 2 for the CTR nonce.
        // ThreadRng is not Send, so keep it out of the await scope.
        let ul_key: Vec<u32> = {
            let mut rng = rand::thread_rng();
            (0..6).map(|_| rng.next_u32()).collect()
        };
        let file_key = a32_to_bytes(&ul_key[..4]);
        let nonce = a32_to_bytes(&[ul_key[4], ul_key[5], 0, 0]);
        let chunk_mac_iv = a32_to_bytes(&[ul_key[4], ul_key[5], ul_key[4], ul_key[5]]);

        let cipher = Aes128::new(GenericArray::from_slice(&file_key));
        let mut ctr = Aes128Ctr::new(
            GenericArray::from_slice(&file_key),
            GenericArray::from_slice(&nonce),
        );

        let mut file = tokio::fs::File::open(path).await?;
        let mut file_mac = [0u8; 16];
        let mut completion_handle = String::new();

        for (offset, len) in chunk_sizes(size) {
            let mut chunk = vec![0u8; len as usize];
            file.read_exact(&mut chunk).await?;

            // per-chunk CBC-MAC, folded into the running file MAC
            let mut prev = [0u8; 16];
            prev.copy_from_slice(&chunk_mac_iv);
            for block in chunk.chunks(16) {
                let mut padded = [0u8; 16];
                padded[..block.len()].copy_from_slice(block);
                for (b, p) in padded.iter_mut().zip(prev.iter()) {
                    *b ^= *p;
                }
                cipher.encrypt_block(GenericArray::from_mut_slice(&mut padded));
                prev = padded;
            }
            for (m, p) in file_mac.iter_mut().zip(prev.iter()) {
                *m ^= *p;
            }
            cipher.encrypt_block(GenericArray::from_mut_slice(&mut file_mac));

            ctr.apply_keystream(&mut chunk);

            debug!(offset, len, "Uploading chunk");
            let response = self
                .http
                .post(format!("{upload_url}/{offset}"))
                .body(chunk)
                .send()
                .await?
                .error_for_status()?;
            completion_handle = response.text().await?;
        }

        if completion_handle.is_empty() {
            return Err(protocol("upload finished without a completion handle"));
        }
        if let Ok(code) = completion_handle.trim().parse::<i64>() {
            return Err(ProviderError::Api(code));
        }

        // condensed MAC and the obfuscated 8-word node key
        let mac_words = bytes_to_a32(&file_mac);
        let meta_mac = [mac_words[0] ^ mac_words[1], mac_words[2] ^ mac_words[3]];
        let node_key = [
            ul_key[0] ^ ul_key[4],
            ul_key[1] ^ ul_key[5],
            ul_key[2] ^ meta_mac[0],
            ul_key[3] ^ meta_mac[1],
            ul_key[4],
            ul_key[5],
            meta_mac[0],
            meta_mac[1],
        ];

        let attrs = encrypt_attributes(filename, &file_key);
        let wrapped_key = encrypt_key(&a32_to_bytes(&node_key), &self.master_key);

        let committed = self
            .request(json!({
                "a": "p",
                "t": self.root_handle,
                "i": request_id(),
                "n": [{
                    "h": completion_handle,
                    "t": 0,
                    "a": attrs,
                    "k": b64url_encode(&wrapped_key),
                }],
            }))
            .await?;

        let node_handle = committed
            .get("f")
            .and_then(Value::as_array)
            .and_then(|nodes| nodes.first())
            .and_then(|node| node.get("h").and_then(Value::as_str))
            .ok_or_else(|| protocol("node commit returned no handle"))?
            .to_string();

        let exported = self.request(json!({ "a": "l", "n": node_handle })).await?;
        let public_handle = exported
            .as_str()
            .ok_or_else(|| protocol("export returned no public handle"))?;

        Ok(format!(
            "{LINK_ORIGIN}/#!{public_handle}!{}",
            b64url_encode(&a32_to_bytes(&node_key))
        ))
    }
}

/// One `/cs` command round-trip. Transient -3 answers are retried with
/// a short backoff; any other negative integer is a MEGA error code.
async fn api_request(
    http: &Client,
    seq: &AtomicU64,
    sid: Option<&str>,
    cmd: Value,
) -> Result<Value, ProviderError> {
    let id = seq.fetch_add(1, Ordering::Relaxed);
    let mut url = format!("{API_ORIGIN}/cs?id={id}");
    if let Some(sid) = sid {
        url.push_str("&sid=");
        url.push_str(sid);
    }

    let payload = json!([cmd]);
    let mut attempt = 0;
    loop {
        let response = http
            .post(&url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;

        let result = match &body {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };

        if let Some(code) = result.as_i64() {
            attempt += 1;
            if code == -3 && attempt < EAGAIN_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                continue;
            }
            return Err(ProviderError::Api(code));
        }

        return Ok(result);
    }
}

/// Recovers the session id: the RSA private key arrives as four MPIs
/// (p, q, d, u) wrapped with the master key; the session id is the
/// first 43 bytes of `csid^d mod pq`, base64url-encoded.
fn decrypt_session_id(privk: &[u8], csid: &[u8]) -> Result<String, ProviderError> {
    let (p, rest) = read_mpi(privk).ok_or_else(|| protocol("bad RSA key: p"))?;
    let (q, rest) = read_mpi(rest).ok_or_else(|| protocol("bad RSA key: q"))?;
    let (d, _) = read_mpi(rest).ok_or_else(|| protocol("bad RSA key: d"))?;
    let (encrypted, _) = read_mpi(csid).ok_or_else(|| protocol("bad session id"))?;

    let n = &p * &q;
    let decrypted = encrypted.modpow(&d, &n).to_bytes_be();
    if decrypted.len() < 43 {
        return Err(protocol("session id too short"));
    }
    Ok(b64url_encode(&decrypted[..43]))
}

/// Random 10-character tag MEGA uses to de-duplicate mutating commands.
fn request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

fn protocol(detail: &str) -> ProviderError {
    ProviderError::Protocol(detail.to_string())
}
