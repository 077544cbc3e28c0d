use std::future::Future;

use common::error::AppError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Options controlling how a delimited file is cut into chunks.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    /// Delimiter appended after every written line.
    pub delimiter: String,
    /// Maximum number of data lines per chunk, excluding the header.
    pub line_limit: usize,
}

impl SplitOptions {
    pub fn new(line_limit: usize) -> Self {
        Self {
            delimiter: "\n".to_string(),
            line_limit,
        }
    }
}

#[derive(Debug)]
pub struct SplitResult {
    pub total_chunks: usize,
    pub options: SplitOptions,
}

/// Split a line-oriented input into chunks of at most `line_limit` data
/// lines, replicating the first line as a header at the top of every chunk.
///
/// Outputs are created lazily through `make_output`, called with the chunk
/// index right before the first line of that chunk is written. An input with
/// a header but no data rows still produces one header-only chunk.
pub async fn split<R, F, Fut, W>(
    input: R,
    options: SplitOptions,
    mut make_output: F,
) -> Result<SplitResult, AppError>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<W, AppError>>,
    W: AsyncWrite + Unpin,
{
    if options.line_limit == 0 {
        return Err(AppError::InvalidArgument(
            "Provide a positive lineLimit".to_string(),
        ));
    }

    let mut lines = input.lines();
    let mut header: Option<String> = None;
    let mut output: Option<W> = None;
    let mut chunk_index = 0usize;
    let mut line_index = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                close_output(&mut output).await;
                return Err(err.into());
            }
        };

        if header.is_none() {
            header = Some(line);
            continue;
        }

        if line_index == 0 {
            if let Some(mut previous) = output.take() {
                previous.shutdown().await?;
            }

            debug!(chunk_index, "opening chunk output");
            let mut next = make_output(chunk_index).await?;
            chunk_index += 1;

            let header_line = header.as_deref().unwrap_or_default();
            if let Err(err) = write_line(&mut next, header_line, &options.delimiter).await {
                let _ = next.shutdown().await;
                return Err(err);
            }
            output = Some(next);
        }

        let writer = output.as_mut().expect("output open while writing lines");
        if let Err(err) = write_line(writer, &line, &options.delimiter).await {
            close_output(&mut output).await;
            return Err(err);
        }

        line_index = (line_index + 1) % options.line_limit;
    }

    let Some(header) = header else {
        return Err(AppError::EmptyInput);
    };

    if let Some(mut open) = output.take() {
        open.shutdown().await?;
    } else {
        // Header-only input still yields one chunk
        let mut only = make_output(chunk_index).await?;
        chunk_index += 1;
        write_line(&mut only, &header, &options.delimiter).await?;
        only.shutdown().await?;
    }

    Ok(SplitResult {
        total_chunks: chunk_index,
        options,
    })
}

async fn write_line<W>(writer: &mut W, line: &str, delimiter: &str) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(delimiter.as_bytes()).await?;
    Ok(())
}

async fn close_output<W>(output: &mut Option<W>)
where
    W: AsyncWrite + Unpin,
{
    if let Some(mut writer) = output.take() {
        let _ = writer.shutdown().await;
    }
}
