use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe, catch_unwind};
use std::sync::Once;
use tracing::debug;

thread_local! {
    /// Set while the current thread is inside [`run_guarded`].
    static GUARDED: Cell<bool> = const { Cell::new(false) };
}

static QUIET_HOOK: Once = Once::new();

/// Outcome of handing a buffer to an image codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decodability {
    /// The codec produced pixels.
    Decodable,
    /// The codec rejected the buffer with an error.
    Undecodable(String),
    /// The codec panicked while decoding.
    Panicked(String),
}

impl Decodability {
    pub fn is_decodable(&self) -> bool {
        matches!(self, Decodability::Decodable)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decodability::Decodable => "decodable",
            Decodability::Undecodable(_) => "undecodable",
            Decodability::Panicked(_) => "panicked",
        }
    }
}

impl fmt::Display for Decodability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decodability::Decodable => f.write_str("decodable"),
            Decodability::Undecodable(reason) => write!(f, "undecodable ({reason})"),
            Decodability::Panicked(reason) => write!(f, "decoder panicked ({reason})"),
        }
    }
}

/// A `DecodeOracle` classifies a buffer as decodable or not.
///
/// The mutation session never calls an oracle; it is the caller that decides
/// what an undecodable result means (keep it, skip saving it, retry).
pub trait DecodeOracle: Send + Sync {
    fn name(&self) -> &'static str;

    fn examine(&self, data: &[u8]) -> Decodability;
}

/// Chains a panic hook that stays silent for panics raised inside
/// [`run_guarded`] and defers to the previous hook everywhere else.
fn install_quiet_hook() {
    QUIET_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARDED.with(Cell::get) {
                debug!(location = ?info.location(), "Decoder panicked");
            } else {
                previous(info);
            }
        }));
    });
}

/// Runs `decode` in-process, turning a panic into [`Decodability::Panicked`].
///
/// Panics caught here are not printed to stderr; the message ends up in the
/// returned verdict instead.
fn run_guarded<F>(decode: F) -> Decodability
where
    F: FnOnce() -> Result<(), String>,
{
    install_quiet_hook();
    let outer = GUARDED.replace(true);
    let result = catch_unwind(AssertUnwindSafe(decode));
    GUARDED.set(outer);

    match result {
        Ok(Ok(())) => Decodability::Decodable,
        Ok(Err(reason)) => Decodability::Undecodable(reason),
        Err(panic_payload) => {
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic type".to_string()
            };
            Decodability::Panicked(msg)
        }
    }
}

/// Full JPEG decode through the pure-Rust `jpeg-decoder` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegDecoderOracle;

impl JpegDecoderOracle {
    pub fn new() -> Self {
        JpegDecoderOracle
    }
}

impl DecodeOracle for JpegDecoderOracle {
    fn name(&self) -> &'static str {
        "jpeg-decoder"
    }

    fn examine(&self, data: &[u8]) -> Decodability {
        let verdict = run_guarded(|| {
            let mut decoder = jpeg_decoder::Decoder::new(data);
            decoder.decode().map(|_| ()).map_err(|err| err.to_string())
        });
        debug!(oracle = self.name(), verdict = verdict.label(), "Examined buffer");
        verdict
    }
}

/// Adapts any decode function into an oracle.
pub struct FnOracle<F>
where
    F: Fn(&[u8]) -> Result<(), String> + Send + Sync,
{
    name: &'static str,
    decode: F,
}

impl<F> FnOracle<F>
where
    F: Fn(&[u8]) -> Result<(), String> + Send + Sync,
{
    pub fn new(name: &'static str, decode: F) -> Self {
        Self { name, decode }
    }
}

impl<F> DecodeOracle for FnOracle<F>
where
    F: Fn(&[u8]) -> Result<(), String> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn examine(&self, data: &[u8]) -> Decodability {
        run_guarded(|| (self.decode)(data))
    }
}
