//! Brazilian taxpayer document validation (CPF and CNPJ check digits).

/// Strips everything but digits, so formatted documents ("529.982.247-25",
/// "11.222.333/0001-81") validate the same as bare ones.
pub fn sanitize_document(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn all_same_digit(digits: &[u32]) -> bool {
    digits.windows(2).all(|pair| pair[0] == pair[1])
}

fn to_digits(value: &str) -> Vec<u32> {
    value.chars().filter_map(|c| c.to_digit(10)).collect()
}

/// Validates an 11-digit CPF using the modulo-11 check-digit algorithm.
/// Sequences of a single repeated digit pass the arithmetic but are not
/// issued, so they are rejected outright.
pub fn is_valid_cpf(value: &str) -> bool {
    let digits = to_digits(&sanitize_document(value));
    if digits.len() != 11 || all_same_digit(&digits) {
        return false;
    }

    let verifier = |slice_len: usize| -> u32 {
        let sum: u32 = digits[..slice_len]
            .iter()
            .enumerate()
            .map(|(index, digit)| digit * (slice_len as u32 + 1 - index as u32))
            .sum();
        let modulo = (sum * 10) % 11;
        if modulo == 10 {
            0
        } else {
            modulo
        }
    };

    verifier(9) == digits[9] && verifier(10) == digits[10]
}

/// Validates a 14-digit CNPJ using its weighted modulo-11 check digits.
pub fn is_valid_cnpj(value: &str) -> bool {
    let digits = to_digits(&sanitize_document(value));
    if digits.len() != 14 || all_same_digit(&digits) {
        return false;
    }

    const FACTORS_ONE: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    const FACTORS_TWO: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

    let verifier = |slice_len: usize, factors: &[u32]| -> u32 {
        let sum: u32 = digits[..slice_len]
            .iter()
            .zip(factors.iter())
            .map(|(digit, factor)| digit * factor)
            .sum();
        let modulo = sum % 11;
        if modulo < 2 {
            0
        } else {
            11 - modulo
        }
    };

    verifier(12, &FACTORS_ONE) == digits[12] && verifier(13, &FACTORS_TWO) == digits[13]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_only_digits() {
        assert_eq!(sanitize_document("529.982.247-25"), "52998224725");
        assert_eq!(sanitize_document("(11) 98765-4321"), "11987654321");
        assert_eq!(sanitize_document(""), "");
    }

    #[test]
    fn accepts_known_valid_cpf() {
        assert!(is_valid_cpf("52998224725"));
        assert!(is_valid_cpf("529.982.247-25"));
    }

    #[test]
    fn rejects_repeated_digit_cpf() {
        assert!(!is_valid_cpf("11111111111"));
        assert!(!is_valid_cpf("00000000000"));
        assert!(!is_valid_cpf("99999999999"));
    }

    #[test]
    fn rejects_cpf_with_bad_check_digits() {
        assert!(!is_valid_cpf("52998224726"));
        assert!(!is_valid_cpf("52998224735"));
    }

    #[test]
    fn rejects_cpf_of_wrong_length() {
        assert!(!is_valid_cpf("5299822472"));
        assert!(!is_valid_cpf("529982247250"));
    }

    #[test]
    fn accepts_known_valid_cnpj() {
        assert!(is_valid_cnpj("11222333000181"));
        assert!(is_valid_cnpj("11.222.333/0001-81"));
    }

    #[test]
    fn rejects_repeated_digit_cnpj() {
        assert!(!is_valid_cnpj("11111111111111"));
    }

    #[test]
    fn rejects_cnpj_with_bad_check_digits() {
        assert!(!is_valid_cnpj("11222333000182"));
        assert!(!is_valid_cnpj("11222333000191"));
    }
}
