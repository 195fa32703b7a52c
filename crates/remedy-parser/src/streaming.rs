//! Streaming parser.
//!
//! Reads a file line by line, decodes each line with [`crate::decoder`],
//! batches successes, and flushes batches to a caller-supplied sink. Honors
//! cooperative cancellation and assigns monotonically increasing line
//! ordinals.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use chrono::Utc;
use remedy_core::model::LogEntry;
use tokio_util::sync::CancellationToken;

use crate::decoder::parse_line;
use crate::error::{ParseFileError, SinkError};

/// Line buffers are pre-allocated to this size; `read_line` grows the
/// buffer further if a single line exceeds it, so a 1 MiB pre-allocation is
/// a throughput hint, not a hard cap.
const LINE_BUFFER_HINT: usize = 1024 * 1024;

/// Parse a file already opened as `reader`, assigning `file_number` to every
/// produced entry. Returns the total number of entries flushed. On
/// cancellation or a sink error, any partial batch already accumulated is
/// flushed best-effort before the error is returned, carrying the same
/// partial count.
pub fn parse_reader<R, S>(
    reader: R,
    tenant: &str,
    job: &str,
    file_number: u16,
    batch_size: usize,
    cancel: &CancellationToken,
    mut sink: S,
) -> Result<u64, ParseFileError>
where
    R: Read,
    S: FnMut(Vec<LogEntry>) -> Result<(), SinkError>,
{
    let mut buffered = BufReader::with_capacity(LINE_BUFFER_HINT, reader);
    let mut line_buf = String::new();
    let mut batch: Vec<LogEntry> = Vec::with_capacity(batch_size);
    let mut line_number: u32 = 0;
    let mut total: u64 = 0;

    loop {
        line_buf.clear();
        let bytes_read = match buffered.read_line(&mut line_buf) {
            Ok(n) => n,
            Err(source) => {
                flush_best_effort(&mut batch, &mut total, &mut sink);
                return Err(ParseFileError::Io {
                    source,
                    parsed_so_far: total,
                });
            }
        };
        if bytes_read == 0 {
            break;
        }

        // Advance the ordinal before the empty-line check below, so blank
        // lines still consume a line number.
        line_number += 1;

        if cancel.is_cancelled() {
            flush_best_effort(&mut batch, &mut total, &mut sink);
            return Err(ParseFileError::Cancelled {
                parsed_so_far: total,
            });
        }

        let trimmed_end = line_buf.trim_end_matches(['\n', '\r']);
        if trimmed_end.is_empty() {
            continue;
        }

        if let Some(mut entry) = parse_line(trimmed_end) {
            entry.tenant_id = tenant.into();
            entry.job_id = job.into();
            entry.file_number = file_number;
            entry.line_number = line_number;
            entry.entry_id = uuid::Uuid::new_v4().to_string().into();
            entry.ingested_at = Utc::now();
            batch.push(entry);

            if batch.len() >= batch_size {
                let flushed = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                let count = flushed.len() as u64;
                if let Err(source) = sink(flushed) {
                    return Err(ParseFileError::Sink {
                        source,
                        parsed_so_far: total,
                    });
                }
                total += count;
            }
        } else {
            log::trace!("skipped unparseable line {line_number} in file {file_number}");
        }
    }

    if !batch.is_empty() {
        let count = batch.len() as u64;
        if let Err(source) = sink(batch) {
            return Err(ParseFileError::Sink {
                source,
                parsed_so_far: total,
            });
        }
        total += count;
    }

    log::debug!("parsed {total} entries from file {file_number} for job {job}");
    Ok(total)
}

fn flush_best_effort<S>(batch: &mut Vec<LogEntry>, total: &mut u64, sink: &mut S)
where
    S: FnMut(Vec<LogEntry>) -> Result<(), SinkError>,
{
    if batch.is_empty() {
        return;
    }
    let flushed = std::mem::take(batch);
    let count = flushed.len() as u64;
    if sink(flushed).is_ok() {
        *total += count;
    } else {
        log::warn!("best-effort flush on cancel/error failed; {count} entries dropped");
    }
}

/// Open `path` and parse it. Thin wrapper over [`parse_reader`] for the
/// external ingest-orchestrator contract in.
pub fn parse_file<S>(
    path: &Path,
    tenant: &str,
    job: &str,
    file_number: u16,
    batch_size: usize,
    cancel: &CancellationToken,
    sink: S,
) -> Result<u64, ParseFileError>
where
    S: FnMut(Vec<LogEntry>) -> Result<(), SinkError>,
{
    let file = std::fs::File::open(path).map_err(|source| ParseFileError::Io {
        source,
        parsed_so_far: 0,
    })?;
    parse_reader(file, tenant, job, file_number, batch_size, cancel, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_line(ty: &str) -> String {
        format!(
            "<{ty}><TrID: T><TID: T><RPC ID: R><Queue: Q><Client-RPC: C><USER: U><Overlay-Group: O> /* Mon Jan 02 2006 15:04:05.0000 */ CODE FORM 10 ms\n"
        )
    }

    #[test]
    fn batches_and_flushes_at_boundary() {
        let mut data = String::new();
        for _ in 0..5 {
            data.push_str(&sample_line("API"));
        }
        let cursor = Cursor::new(data.into_bytes());
        let mut flushes = vec![];
        let cancel = CancellationToken::new();
        let total = parse_reader(cursor, "t1", "j1", 1, 2, &cancel, |batch| {
            flushes.push(batch.len());
            Ok(())
        })
        .unwrap();
        assert_eq!(total, 5);
        assert_eq!(flushes, vec![2, 2, 1]);
    }

    #[test]
    fn line_numbers_are_assigned_in_read_order() {
        let mut data = String::new();
        data.push_str(&sample_line("API"));
        data.push('\n'); // blank line — still consumes an ordinal
        data.push_str(&sample_line("SQL"));
        let cursor = Cursor::new(data.into_bytes());
        let mut seen = vec![];
        let cancel = CancellationToken::new();
        parse_reader(cursor, "t1", "j1", 1, 100, &cancel, |batch| {
            seen.extend(batch.into_iter().map(|e| e.line_number));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![1, 3]);
    }

    #[test]
    fn malformed_lines_do_not_consume_batch_slots() {
        let mut data = String::new();
        data.push_str("not a valid line\n");
        data.push_str(&sample_line("API"));
        let cursor = Cursor::new(data.into_bytes());
        let cancel = CancellationToken::new();
        let total = parse_reader(cursor, "t1", "j1", 1, 10, &cancel, |_| Ok(())).unwrap();
        assert_eq!(total, 1);
    }

    #[test]
    fn cancellation_flushes_partial_batch_and_reports_count() {
        let mut data = String::new();
        for _ in 0..3 {
            data.push_str(&sample_line("API"));
        }
        let cursor = Cursor::new(data.into_bytes());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = parse_reader(cursor, "t1", "j1", 1, 10, &cancel, |_| Ok(()));
        match result {
            Err(ParseFileError::Cancelled { parsed_so_far }) => assert_eq!(parsed_so_far, 0),
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[test]
    fn sink_error_aborts_with_partial_count() {
        let mut data = String::new();
        for _ in 0..3 {
            data.push_str(&sample_line("API"));
        }
        let cursor = Cursor::new(data.into_bytes());
        let cancel = CancellationToken::new();
        let result = parse_reader(cursor, "t1", "j1", 1, 1, &cancel, |_| Err("boom".into()));
        match result {
            Err(ParseFileError::Sink { parsed_so_far, .. }) => assert_eq!(parsed_so_far, 0),
            other => panic!("expected Sink error, got {other:?}"),
        }
    }

    #[test]
    fn every_entry_gets_tenant_job_and_unique_entry_id() {
        let data = sample_line("API");
        let cursor = Cursor::new(data.into_bytes());
        let cancel = CancellationToken::new();
        let mut entries = vec![];
        parse_reader(cursor, "tenant-x", "job-y", 7, 10, &cancel, |batch| {
            entries.extend(batch);
            Ok(())
        })
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tenant_id.as_str(), "tenant-x");
        assert_eq!(entries[0].job_id.as_str(), "job-y");
        assert_eq!(entries[0].file_number, 7);
        assert!(!entries[0].entry_id.is_empty());
    }
}
