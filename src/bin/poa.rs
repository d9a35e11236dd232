extern crate clap;
use clap::*;
use std::io::Write;

use poagraph::io;
use poagraph::poa::{AlignmentEngine, AlignmentParams, AlignmentType, Graph, ScalarAlignmentEngine};

fn main() -> anyhow::Result<()> {
    let args = make_app().get_matches();
    execute(&args)
}

fn make_app() -> Command {
    Command::new("poa")
        .version(crate_version!())
        .author(crate_authors!())
        .about("Builds a partial-order alignment (POA) graph from FASTA/FASTQ file(s)")
        .color(ColorChoice::Auto)
        .after_help(
            r###"
Reads records from a FASTA or FASTQ file, seeds a POA graph with the first
record, and aligns + incorporates every subsequent record against the
growing graph with a bundled affine-gap DP aligner.

Each input file becomes its own independent graph; multiple files are
processed in parallel with --parallel, never multi-threaded within a
single graph's construction.

Notes:
* Supports both plain text and gzipped (.gz) files
* Reads from stdin if input file is 'stdin'
* `--quality` uses per-base FASTQ quality scores as node weights
  (weight = quality_byte - 33); without it every base is weighted 1.0
* At least one of --msa, --consensus, --dot must be given

Examples:
1. Emit a consensus sequence:
   poa reads.fa --consensus

2. Emit an MSA, quality-weighted from a FASTQ file:
   poa reads.fq --quality --msa

3. Dump the graph as DOT for visualization:
   poa reads.fa --dot -o graph.dot

4. Build independent graphs for several loci in parallel:
   poa locus1.fa locus2.fa locus3.fa --consensus --parallel 3

"###,
        )
        .arg(
            Arg::new("infiles")
                .required(true)
                .num_args(1..)
                .index(1)
                .help("Input FASTA/FASTQ file(s), one POA graph per file"),
        )
        .arg(
            Arg::new("quality")
                .long("quality")
                .action(ArgAction::SetTrue)
                .help("Weight bases by FASTQ quality score instead of uniformly"),
        )
        .arg(Arg::new("msa").long("msa").action(ArgAction::SetTrue).help("Emit the MSA"))
        .arg(
            Arg::new("consensus")
                .long("consensus")
                .action(ArgAction::SetTrue)
                .help("Emit the heaviest-bundle consensus sequence"),
        )
        .arg(Arg::new("dot").long("dot").action(ArgAction::SetTrue).help("Emit a DOT dump of the graph"))
        .arg(
            Arg::new("match")
                .long("match")
                .short('m')
                .value_parser(value_parser!(i32))
                .default_value("5")
                .allow_negative_numbers(true)
                .help("Score for matching bases"),
        )
        .arg(
            Arg::new("mismatch")
                .long("mismatch")
                .short('n')
                .value_parser(value_parser!(i32))
                .default_value("-4")
                .allow_negative_numbers(true)
                .help("Score for mismatching bases"),
        )
        .arg(
            Arg::new("gap_open")
                .long("gap-open")
                .short('g')
                .value_parser(value_parser!(i32))
                .default_value("-8")
                .allow_negative_numbers(true)
                .help("Gap opening penalty"),
        )
        .arg(
            Arg::new("gap_extend")
                .long("gap-extend")
                .short('e')
                .value_parser(value_parser!(i32))
                .default_value("-6")
                .allow_negative_numbers(true)
                .help("Gap extension penalty"),
        )
        .arg(
            Arg::new("algorithm")
                .long("algorithm")
                .short('l')
                .value_parser(["local", "global", "semi_global"])
                .default_value("global")
                .help("Alignment mode used to incorporate records after the first"),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .short('p')
                .value_parser(value_parser!(usize))
                .default_value("1")
                .help("Number of files to build graphs for concurrently"),
        )
        .arg(
            Arg::new("outfile")
                .long("outfile")
                .short('o')
                .num_args(1)
                .default_value("stdout")
                .help("Output filename. [stdout] for screen"),
        )
}

fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    let want_msa = args.get_flag("msa");
    let want_consensus = args.get_flag("consensus");
    let want_dot = args.get_flag("dot");
    if !want_msa && !want_consensus && !want_dot {
        anyhow::bail!("at least one of --msa, --consensus, --dot is required");
    }

    let infiles: Vec<String> = args.get_many::<String>("infiles").unwrap().cloned().collect();
    let parallel = *args.get_one::<usize>("parallel").unwrap();
    let mut writer = io::writer(args.get_one::<String>("outfile").unwrap());

    if parallel <= 1 || infiles.len() == 1 {
        for infile in &infiles {
            writer.write_all(process_file(infile, args)?.as_bytes())?;
        }
    } else {
        // Each file builds an independent Graph; construction of any single
        // graph is never split across threads — only the per-file graphs
        // run concurrently, never the construction of one graph itself.
        let (snd, rcv) = crossbeam::channel::bounded::<(usize, anyhow::Result<String>)>(infiles.len());
        crossbeam::scope(|s| {
            let chunks: Vec<Vec<(usize, &String)>> = {
                let mut chunks = vec![Vec::new(); parallel];
                for (i, infile) in infiles.iter().enumerate() {
                    chunks[i % parallel].push((i, infile));
                }
                chunks
            };
            for chunk in chunks {
                let sendr = snd.clone();
                s.spawn(move |_| {
                    for (i, infile) in chunk {
                        let result = process_file(infile, args);
                        sendr.send((i, result)).unwrap();
                    }
                });
            }
            drop(snd);
        })
        .unwrap();

        let mut outputs: Vec<Option<String>> = vec![None; infiles.len()];
        for (i, result) in rcv.iter() {
            outputs[i] = Some(result?);
        }
        for output in outputs.into_iter().flatten() {
            writer.write_all(output.as_bytes())?;
        }
    }

    Ok(())
}

/// Builds one independent [`Graph`] from `infile` and renders the requested
/// output(s) as a single string (so parallel workers need no shared writer).
fn process_file(infile: &str, args: &ArgMatches) -> anyhow::Result<String> {
    let use_quality = args.get_flag("quality");
    let want_msa = args.get_flag("msa");
    let want_consensus = args.get_flag("consensus");
    let want_dot = args.get_flag("dot");

    let params = AlignmentParams {
        match_score: *args.get_one::<i32>("match").unwrap(),
        mismatch_score: *args.get_one::<i32>("mismatch").unwrap(),
        gap_open: *args.get_one::<i32>("gap_open").unwrap(),
        gap_extend: *args.get_one::<i32>("gap_extend").unwrap(),
    };
    let algorithm = match args.get_one::<String>("algorithm").unwrap().as_str() {
        "local" => AlignmentType::Local,
        "semi_global" => AlignmentType::SemiGlobal,
        _ => AlignmentType::Global,
    };

    let is_fastq = use_quality || io::is_fastq(infile);
    let (sequences, qualities) = read_records(infile, is_fastq)?;
    if sequences.is_empty() {
        anyhow::bail!("{infile} contains no records");
    }

    let mut graph = if use_quality {
        Graph::new_from_quality(&sequences[0], &qualities[0])?
    } else {
        Graph::new_uniform(&sequences[0], 1.0)?
    };

    let engine = ScalarAlignmentEngine::new(params, algorithm);
    for i in 1..sequences.len() {
        let alignment = engine.align(&sequences[i], &graph);
        if use_quality {
            graph.add_alignment_from_quality(&alignment, &sequences[i], &qualities[i])?;
        } else {
            graph.add_alignment_uniform(&alignment, &sequences[i], 1.0)?;
        }
    }

    let mut out = String::new();
    if want_msa {
        for row in graph.generate_msa(want_consensus)? {
            out.push_str(&row);
            out.push('\n');
        }
    } else if want_consensus {
        out.push_str(&graph.generate_consensus()?);
        out.push('\n');
    }
    if want_dot {
        out.push_str(&graph.to_dot());
    }

    Ok(out)
}

/// Reads every record of `infile` as `(sequence, quality)` pairs. FASTA
/// records get an all-`'I'` (quality 40) placeholder quality string so the
/// two code paths share a return type; it is only consulted when
/// `--quality` is given against a genuinely quality-bearing FASTQ input.
fn read_records(infile: &str, is_fastq: bool) -> anyhow::Result<(Vec<Vec<u8>>, Vec<Vec<u8>>)> {
    let reader = io::reader(infile);
    let mut sequences = Vec::new();
    let mut qualities = Vec::new();

    if is_fastq {
        let mut fq_in = noodles_fastq::io::Reader::new(reader);
        for result in fq_in.records() {
            let record = result?;
            sequences.push(record.sequence().to_vec());
            qualities.push(record.quality_scores().to_vec());
        }
    } else {
        let mut fa_in = noodles_fasta::io::Reader::new(reader);
        for result in fa_in.records() {
            let record = result?;
            let seq = record.sequence().get(..).unwrap_or(&[]).to_vec();
            let quality = vec![b'I'; seq.len()];
            sequences.push(seq);
            qualities.push(quality);
        }
    }

    Ok((sequences, qualities))
}
