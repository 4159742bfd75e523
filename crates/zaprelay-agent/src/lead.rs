// SPDX-FileCopyrightText: 2026 Zaprelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword lead-temperature classifier.

use zaprelay_core::types::LeadTemperature;

/// Purchase intent.
const HOT_KEYWORDS: &[&str] = &[
    "comprar",
    "fechar",
    "preço",
    "preco",
    "orçamento",
    "orcamento",
    "pagamento",
    "pix",
    "boleto",
    "quanto custa",
];

/// Information seeking.
const WARM_KEYWORDS: &[&str] = &[
    "interesse",
    "informação",
    "informacao",
    "detalhes",
    "como funciona",
    "catálogo",
    "catalogo",
    "talvez",
];

/// Classifies one inbound text. `None` means no signal; the conversation
/// keeps its current temperature.
pub fn classify_temperature(text: &str) -> Option<LeadTemperature> {
    let lower = text.to_lowercase();
    if HOT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some(LeadTemperature::Hot)
    } else if WARM_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some(LeadTemperature::Warm)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchase_intent_is_hot() {
        assert_eq!(classify_temperature("Quanto custa o plano anual?"), Some(LeadTemperature::Hot));
        assert_eq!(classify_temperature("posso pagar no PIX?"), Some(LeadTemperature::Hot));
        assert_eq!(classify_temperature("Qual o PREÇO?"), Some(LeadTemperature::Hot));
    }

    #[test]
    fn information_seeking_is_warm() {
        assert_eq!(classify_temperature("Me manda o catálogo"), Some(LeadTemperature::Warm));
        assert_eq!(classify_temperature("como funciona a entrega?"), Some(LeadTemperature::Warm));
    }

    #[test]
    fn hot_wins_over_warm() {
        assert_eq!(
            classify_temperature("tenho interesse, quero fechar hoje"),
            Some(LeadTemperature::Hot)
        );
    }

    #[test]
    fn small_talk_has_no_signal() {
        assert_eq!(classify_temperature("bom dia!"), None);
        assert_eq!(classify_temperature(""), None);
    }
}
