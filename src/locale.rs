//! Resolves a stable `message` key into operator-facing text in one of the
//! three supported languages. There is no localization crate in the
//! surrounding ecosystem for this niche, so the table is a plain `match`
//! rather than reaching for a crate when the mapping is this small and
//! static.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    EnUs,
    PtBr,
    EsEs,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Language::EnUs => "en-US",
            Language::PtBr => "pt-BR",
            Language::EsEs => "es-ES",
        })
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en-US" | "en" => Ok(Language::EnUs),
            "pt-BR" | "pt" => Ok(Language::PtBr),
            "es-ES" | "es" => Ok(Language::EsEs),
            other => Err(format!("`{other}` is not a supported language")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    MigrationStarted,
    MigrationSkippedAlreadyExists,
    MigrationSucceeded,
    MigrationFailed,
    GitOpsScanStarted,
    GitOpsNoValidatedReplacements,
    GitOpsPullRequestOpened,
    ClassificationSummary,
}

impl MessageKey {
    pub fn localize(self, language: Language) -> &'static str {
        use Language::*;
        use MessageKey::*;
        match (self, language) {
            (MigrationStarted, EnUs) => "starting migration of image to target registry",
            (MigrationStarted, PtBr) => "iniciando migração da imagem para o registro de destino",
            (MigrationStarted, EsEs) => "iniciando la migración de la imagen al registro de destino",

            (MigrationSkippedAlreadyExists, EnUs) => "image already present in target registry, skipping",
            (MigrationSkippedAlreadyExists, PtBr) => "imagem já presente no registro de destino, pulando",
            (MigrationSkippedAlreadyExists, EsEs) => "la imagen ya existe en el registro de destino, omitiendo",

            (MigrationSucceeded, EnUs) => "image migrated successfully",
            (MigrationSucceeded, PtBr) => "imagem migrada com sucesso",
            (MigrationSucceeded, EsEs) => "imagen migrada correctamente",

            (MigrationFailed, EnUs) => "image migration failed",
            (MigrationFailed, PtBr) => "falha na migração da imagem",
            (MigrationFailed, EsEs) => "error al migrar la imagen",

            (GitOpsScanStarted, EnUs) => "scanning repository for public image references",
            (GitOpsScanStarted, PtBr) => "verificando repositório em busca de referências de imagens públicas",
            (GitOpsScanStarted, EsEs) => "escaneando el repositorio en busca de referencias a imágenes públicas",

            (GitOpsNoValidatedReplacements, EnUs) => "no validated replacements for this repository, skipping commit",
            (GitOpsNoValidatedReplacements, PtBr) => "nenhuma substituição validada para este repositório, pulando commit",
            (GitOpsNoValidatedReplacements, EsEs) => "no hay reemplazos validados para este repositorio, omitiendo commit",

            (GitOpsPullRequestOpened, EnUs) => "pull request opened",
            (GitOpsPullRequestOpened, PtBr) => "pull request aberto",
            (GitOpsPullRequestOpened, EsEs) => "pull request abierto",

            (ClassificationSummary, EnUs) => "classification complete",
            (ClassificationSummary, PtBr) => "classificação concluída",
            (ClassificationSummary, EsEs) => "clasificación completa",
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_supported_languages() {
        assert_eq!(Language::from_str("pt-BR").unwrap(), Language::PtBr);
        assert_eq!(Language::from_str("es-ES").unwrap(), Language::EsEs);
        assert_eq!(Language::from_str("en-US").unwrap(), Language::EnUs);
        assert!(Language::from_str("fr-FR").is_err());
    }

    #[test]
    fn every_key_localizes_in_every_language() {
        let keys = [
            MessageKey::MigrationStarted,
            MessageKey::MigrationSkippedAlreadyExists,
            MessageKey::MigrationSucceeded,
            MessageKey::MigrationFailed,
            MessageKey::GitOpsScanStarted,
            MessageKey::GitOpsNoValidatedReplacements,
            MessageKey::GitOpsPullRequestOpened,
            MessageKey::ClassificationSummary,
        ];
        for key in keys {
            for lang in [Language::EnUs, Language::PtBr, Language::EsEs] {
                assert!(!key.localize(lang).is_empty());
            }
        }
    }
}
