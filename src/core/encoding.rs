//! Residue alphabets and sequence encoding.
//!
//! Nucleotides use the BLASTNA encoding (A=0 C=1 G=2 T=3, IUPAC ambiguity
//! codes 4..13, N=14, gap=15); hot loops additionally pack unambiguous bases
//! into 2-bit NCBI2NA. Amino acids use the 25-letter matrix order
//! ARNDCQEGHILKMFPSTWYVBJZX* shared with the embedded BLOSUM62 data.
//!
//! NCBI reference: ncbi-blast/c++/src/algo/blast/core/blast_encoding.c

pub const BLASTNA_SIZE: usize = 16;
pub const BLASTNA_N: u8 = 14;
pub const BLASTNA_GAP: u8 = 15;

/// Printable form of each BLASTNA code.
pub const BLASTNA_TO_ASCII: [u8; BLASTNA_SIZE] = *b"ACGTRYMKWSBDHVN-";

/// Complement of each BLASTNA code (ambiguity codes map to the complementary
/// ambiguity class; N and gap are self-complementary).
pub const BLASTNA_COMPLEMENT: [u8; BLASTNA_SIZE] =
    [3, 2, 1, 0, 5, 4, 7, 6, 8, 9, 13, 12, 11, 10, 14, 15];

/// IUPAC character (either case) to BLASTNA code. Unrecognized bytes become N.
pub static ASCII_TO_BLASTNA: [u8; 256] = {
    let mut t = [BLASTNA_N; 256];
    let pairs: [(u8, u8); 17] = [
        (b'A', 0),
        (b'C', 1),
        (b'G', 2),
        (b'T', 3),
        (b'U', 3),
        (b'R', 4),
        (b'Y', 5),
        (b'M', 6),
        (b'K', 7),
        (b'W', 8),
        (b'S', 9),
        (b'B', 10),
        (b'D', 11),
        (b'H', 12),
        (b'V', 13),
        (b'N', 14),
        (b'-', 15),
    ];
    let mut i = 0;
    while i < pairs.len() {
        let (c, code) = pairs[i];
        t[c as usize] = code;
        if c.is_ascii_uppercase() {
            t[(c + 32) as usize] = code;
        }
        i += 1;
    }
    t
};

/// Encode an ASCII nucleotide sequence into BLASTNA codes.
pub fn encode_nucleotide(seq: &[u8]) -> Vec<u8> {
    seq.iter().map(|&b| ASCII_TO_BLASTNA[b as usize]).collect()
}

/// Reverse complement of a BLASTNA sequence.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&b| BLASTNA_COMPLEMENT[(b & 0x0f) as usize])
        .collect()
}

/// Pack a BLASTNA sequence into NCBI2NA, four bases per byte. Ambiguity
/// codes collapse onto the two low bits so packed scans stay deterministic;
/// exact-match filtering happens later against the unpacked buffer.
pub fn pack_ncbi2na(seq: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; seq.len().div_ceil(4)];
    for (i, &b) in seq.iter().enumerate() {
        out[i / 4] |= (b & 3) << (6 - 2 * (i % 4));
    }
    out
}

pub const AA_SIZE: usize = 25;
pub const AA_X: u8 = 23;
pub const AA_STOP: u8 = 24;

/// Matrix-order residues: the index of each letter here is its code.
pub const AA_ORDER: &[u8; AA_SIZE] = b"ARNDCQEGHILKMFPSTWYVBJZX*";

/// ASCII amino acid (either case) to matrix-order code. Unknown bytes map
/// to X.
pub static ASCII_TO_AA: [u8; 256] = {
    let mut t = [AA_X; 256];
    let mut i = 0;
    while i < AA_SIZE {
        let c = AA_ORDER[i];
        t[c as usize] = i as u8;
        if c.is_ascii_uppercase() {
            t[(c + 32) as usize] = i as u8;
        }
        i += 1;
    }
    t
};

/// Encode an ASCII protein sequence into matrix-order codes.
pub fn encode_protein(seq: &[u8]) -> Vec<u8> {
    seq.iter().map(|&b| ASCII_TO_AA[b as usize]).collect()
}

/// Genetic code translation table, indexed by 6-bit TCAG codon index.
/// Reference: ncbi-blast/c++/src/algo/blast/core/gencode_singleton.c
#[derive(Debug, Clone)]
pub struct GeneticCode {
    table: [u8; 64],
}

impl GeneticCode {
    /// Build a code table from an NCBI genetic code id (1 = standard).
    /// Unknown ids fall back to the standard code.
    pub fn from_id(id: u8) -> Self {
        let table_str: &[u8; 64] = match id {
            1 => b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG",
            2 => b"FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSS**VVVVAAAADDEEGGGG",
            3 => b"FFLLSSSSYY**CCWWTTTTPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG",
            4 => b"FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG",
            5 => b"FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSSSVVVVAAAADDEEGGGG",
            6 => b"FFLLSSSSYYQQCC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG",
            9 => b"FFLLSSSSYY**CCWWLLLLPPPPHHQQRRRRIIIMTTTTNNNKSSSSVVVVAAAADDEEGGGG",
            11 => b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG",
            _ => {
                log::warn!("genetic code {id} not supported, using standard code");
                b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG"
            }
        };
        let mut table = [0u8; 64];
        table.copy_from_slice(table_str);
        GeneticCode { table }
    }

    /// Translate one BLASTNA codon to a matrix-order amino acid code.
    /// Any ambiguous base yields X.
    pub fn translate_codon(&self, codon: &[u8]) -> u8 {
        debug_assert_eq!(codon.len(), 3);
        let mut idx = 0usize;
        for &b in codon {
            // Codon tables are indexed in TCAG order.
            let bits = match b {
                3 => 0, // T
                1 => 1, // C
                0 => 2, // A
                2 => 3, // G
                _ => return AA_X,
            };
            idx = (idx << 2) | bits;
        }
        ASCII_TO_AA[self.table[idx] as usize]
    }
}

/// Translate one reading frame of a BLASTNA sequence.
///
/// `frame` is 1..=3 for the plus strand, -1..=-3 for the minus strand
/// (translated off the reverse complement).
pub fn translate_frame(seq: &[u8], frame: i8, code: &GeneticCode) -> Vec<u8> {
    debug_assert!((1..=3).contains(&frame.abs()));
    let working;
    let strand_seq: &[u8] = if frame > 0 {
        seq
    } else {
        working = reverse_complement(seq);
        &working
    };
    let start = (frame.unsigned_abs() - 1) as usize;
    if strand_seq.len() < start + 3 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity((strand_seq.len() - start) / 3);
    let mut i = start;
    while i + 3 <= strand_seq.len() {
        out.push(code.translate_codon(&strand_seq[i..i + 3]));
        i += 3;
    }
    out
}

/// Forward-strand DNA coordinate of the first base (in plus-strand order)
/// of the codon encoding protein position `p` in `frame`.
pub fn protein_to_dna(frame: i8, p: usize, dna_len: usize) -> usize {
    debug_assert!((1..=3).contains(&frame.abs()));
    if frame > 0 {
        (frame as usize - 1) + 3 * p
    } else {
        // Position in reverse-complement coordinates, mapped back.
        let r = (-frame as usize - 1) + 3 * p;
        dna_len - r - 3
    }
}

/// Inverse of [`protein_to_dna`]: protein position whose codon starts at the
/// given forward DNA coordinate.
pub fn dna_to_protein(frame: i8, d: usize, dna_len: usize) -> usize {
    debug_assert!((1..=3).contains(&frame.abs()));
    if frame > 0 {
        (d - (frame as usize - 1)) / 3
    } else {
        let r = dna_len - d - 3;
        (r - (-frame as usize - 1)) / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_and_print_round_trip() {
        let enc = encode_nucleotide(b"acgtACGTnrN");
        assert_eq!(enc, vec![0, 1, 2, 3, 0, 1, 2, 3, 14, 4, 14]);
        let printed: Vec<u8> = enc.iter().map(|&c| BLASTNA_TO_ASCII[c as usize]).collect();
        assert_eq!(&printed, b"ACGTACGTNRN");
    }

    #[test]
    fn reverse_complement_involution() {
        let seq = encode_nucleotide(b"ACGTNRY");
        assert_eq!(reverse_complement(&reverse_complement(&seq)), seq);
        assert_eq!(reverse_complement(&encode_nucleotide(b"AACG")), encode_nucleotide(b"CGTT"));
    }

    #[test]
    fn pack_four_bases_per_byte() {
        let seq = encode_nucleotide(b"ACGTA");
        let packed = pack_ncbi2na(&seq);
        assert_eq!(packed.len(), 2);
        assert_eq!(packed[0], 0b00_01_10_11);
        assert_eq!(packed[1], 0b00_00_00_00);
    }

    #[test]
    fn standard_code_translation() {
        let code = GeneticCode::from_id(1);
        // ATG -> M
        assert_eq!(code.translate_codon(&encode_nucleotide(b"ATG")), ASCII_TO_AA[b'M' as usize]);
        // TAA -> stop
        assert_eq!(code.translate_codon(&encode_nucleotide(b"TAA")), AA_STOP);
        // Ambiguity -> X
        assert_eq!(code.translate_codon(&encode_nucleotide(b"ATN")), AA_X);
    }

    #[test]
    fn six_frame_lengths() {
        let seq = encode_nucleotide(b"ATGGCCTAA"); // 9 bases
        let code = GeneticCode::from_id(1);
        assert_eq!(translate_frame(&seq, 1, &code).len(), 3);
        assert_eq!(translate_frame(&seq, 2, &code).len(), 2);
        assert_eq!(translate_frame(&seq, 3, &code).len(), 2);
        assert_eq!(translate_frame(&seq, -1, &code).len(), 3);
        let aa = translate_frame(&seq, 1, &code);
        assert_eq!(aa[0], ASCII_TO_AA[b'M' as usize]);
        assert_eq!(aa[2], AA_STOP);
    }

    #[test]
    fn frame_coordinates_round_trip() {
        let dna_len = 300;
        for frame in [1i8, 2, 3, -1, -2, -3] {
            for p in [0usize, 1, 7, 40] {
                let d = protein_to_dna(frame, p, dna_len);
                assert!(d + 3 <= dna_len, "frame {frame} p {p}");
                assert_eq!(dna_to_protein(frame, d, dna_len), p, "frame {frame} p {p}");
            }
        }
    }
}
