//! Pipeline stages for paper-to-comic generation.
//!
//! Each submodule owns one concern and is tested on its own. The network
//! calls themselves live in [`crate::provider`]; these modules build what
//! goes out and make sense of what comes back.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ request ──▶ (provider) ──▶ extract ──▶ plan ──▶ request ──▶ extract / poll ──▶ export
//! (path/URL)  (payloads)                 (text)    (repair)   (image)      (inline / draw job)   (disk)
//! ```
//!
//! 1. [`input`]:   read or download the PDF and check its magic bytes
//! 2. [`encode`]:  `data:` URL encoding for the upload, decoding for export
//! 3. [`request`]: chat-completions payloads for analysis, planning and
//!    inline image generation
//! 4. [`extract`]: pull text or an image reference out of any of the
//!    response shapes providers actually return
//! 5. [`repair`] and [`plan`]: recover a page plan from whatever the
//!    planning model wrote
//! 6. [`poll`]:    submit draw jobs and poll them to a terminal state
//! 7. [`export`]:  write pages, `comic.json` and `comic.md` atomically

pub mod encode;
pub mod export;
pub mod extract;
pub mod input;
pub mod plan;
pub mod poll;
pub mod repair;
pub mod request;
