//! Incremental decoder for `text/event-stream` bodies from the upstream model API.
//!
//! Network chunks do not respect line or UTF-8 boundaries, so bytes are buffered
//! until a full line is available.

#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    /// Feed raw bytes, get back the payloads of every complete `data:` line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_payload(&line[..line.len() - 1]) {
                out.push(data);
            }
        }
        out
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let rest = line.strip_prefix(b"data:")?;
    let rest = rest.strip_prefix(b" ").unwrap_or(rest);
    Some(String::from_utf8_lossy(rest).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lines_across_chunks() {
        let mut d = SseLineDecoder::default();
        assert!(d.push(b"data: {\"a\"").is_empty());
        assert_eq!(d.push(b":1}\n\ndata: [DONE]\n\n"), vec!["{\"a\":1}".to_string(), "[DONE]".to_string()]);
    }

    #[test]
    fn ignores_comments_and_other_fields() {
        let mut d = SseLineDecoder::default();
        let got = d.push(b": keep-alive\nevent: message\nid: 7\ndata:x\r\n\r\n");
        assert_eq!(got, vec!["x".to_string()]);
    }

    #[test]
    fn multibyte_char_split_between_chunks() {
        let mut d = SseLineDecoder::default();
        let bytes = "data: caf\u{e9}\n".as_bytes();
        let (a, b) = bytes.split_at(bytes.len() - 2);
        assert!(d.push(a).is_empty());
        assert_eq!(d.push(b), vec!["caf\u{e9}".to_string()]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut d = SseLineDecoder::default();
        assert!(d.push(b"data: tail").is_empty());
        assert_eq!(d.finish().as_deref(), Some("tail"));
        assert_eq!(d.finish(), None);
    }
}
