//! Gzip-transparent readers/writers, shared by the `poa` binary.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Opens `input` for buffered reading. `"stdin"` reads from standard input;
/// a `.gz` extension is decompressed transparently.
///
/// ```
/// use std::io::BufRead;
/// let reader = poagraph::io::reader("tests/fixtures/reads.fa");
/// assert_eq!(reader.lines().count(), 8);
/// ```
pub fn reader(input: &str) -> Box<dyn BufRead> {
    if input == "stdin" {
        return Box::new(BufReader::new(std::io::stdin()));
    }

    let path = Path::new(input);
    let file = match File::open(path) {
        Err(why) => panic!("could not open {}: {}", path.display(), why),
        Ok(file) => file,
    };

    if path.extension() == Some(std::ffi::OsStr::new("gz")) {
        Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    }
}

/// Opens `output` for buffered writing. `"stdout"` writes to standard output.
pub fn writer(output: &str) -> Box<dyn Write> {
    if output == "stdout" {
        Box::new(BufWriter::new(std::io::stdout()))
    } else {
        Box::new(BufWriter::new(
            File::create(output).unwrap_or_else(|why| panic!("could not create {output}: {why}")),
        ))
    }
}

/// Sniffs the first non-gzip byte of a file to decide FASTA (`>`) vs FASTQ (`@`).
pub fn is_fastq<P: AsRef<Path>>(path: P) -> bool {
    let path = path.as_ref();
    let mut buffer = [0u8; 1];

    let first_byte = {
        let mut file = File::open(path).unwrap_or_else(|why| panic!("could not open {}: {why}", path.display()));
        file.read_exact(&mut buffer).unwrap();
        buffer[0]
    };

    let first_byte = if first_byte == 0x1f {
        let file = File::open(path).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(file);
        decoder.read_exact(&mut buffer).unwrap();
        buffer[0]
    } else {
        first_byte
    };

    match first_byte {
        b'>' => false,
        b'@' => true,
        other => unreachable!("unrecognized sequence format (leading byte {other:#x})"),
    }
}
