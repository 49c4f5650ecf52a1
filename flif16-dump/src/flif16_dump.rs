//! This example decodes a FLIF16 file and prints its dimensions and a
//! pixel checksum.

// flif16 crate
extern crate flif16;

// CLI crate
extern crate clap;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use clap::{App, Arg};

use flif16::{Decoded, Decoder};

const CHUNK_SIZE: usize = 4096;

/// Feeds `input` into `decoder` in fixed-size chunks, driving the state
/// machine to completion without assuming the whole file is available up
/// front.
fn decode_incrementally(decoder: &mut Decoder, input: &[u8]) -> flif16::Result<Vec<flif16::frame::Frame>> {
    let mut offset = 0;
    loop {
        match decoder.decode()? {
            Decoded::Frames(frames) => return Ok(frames),
            Decoded::Suspended => {
                if offset >= input.len() {
                    panic!("decoder suspended with no more input to feed");
                }
                let end = (offset + CHUNK_SIZE).min(input.len());
                decoder.feed(&input[offset..end]);
                offset = end;
            }
        }
    }
}

/// A simple order-sensitive checksum over every decoded plane, useful for
/// spotting regressions without shipping a full image comparison.
fn checksum(frame: &flif16::frame::Frame) -> u32 {
    let mut sum: u32 = 0;
    for plane in &frame.planes {
        for row in 0..plane.height {
            for col in 0..plane.width {
                sum = sum.wrapping_mul(31).wrapping_add(plane.get(row, col) as u32);
            }
        }
    }
    sum
}

fn main() -> std::io::Result<()> {
    let matches = App::new("flif16-dump")
        .about("Decodes a FLIF16 file and prints its dimensions and a pixel checksum")
        .arg(
            Arg::new("input-path")
                .help("FLIF16 file to analyze")
                .short('i')
                .long("input")
                .takes_value(true)
                .required(true),
        )
        .get_matches();

    let input_path = matches.value_of("input-path").map(Path::new).unwrap();

    let mut input = Vec::new();
    File::open(input_path)?.read_to_end(&mut input)?;

    let mut decoder = Decoder::new();
    let frames = decode_incrementally(&mut decoder, &input)
        .unwrap_or_else(|err| {
            eprintln!("decode failed: {}", err);
            std::process::exit(1);
        });

    for (i, frame) in frames.iter().enumerate() {
        let (width, height) = frame
            .planes
            .first()
            .map(|p| (p.width, p.height))
            .unwrap_or((0, 0));
        println!("frame {}: {}x{} checksum={:#010x}", i, width, height, checksum(frame));
    }

    Ok(())
}
