//! Typed contracts for the JSON stage outputs
//!
//! The analyst and reviewer must return JSON matching these shapes. Parsing
//! is strict on the fields the later stages depend on and lenient everywhere
//! else: auxiliary lists default to empty so a sparse but usable payload is
//! not rejected.

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Research brief produced by the analyst stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystBrief {
    /// Sector description and trends
    pub setor: SectorProfile,
    /// Known and discovered competitors
    pub concorrentes: Vec<Competitor>,
    /// PESTEL factors
    pub contexto_externo: ExternalContext,
    #[serde(default)]
    pub oportunidades_mercado: Vec<String>,
    #[serde(default)]
    pub ameacas_mercado: Vec<String>,
    #[serde(default)]
    pub benchmarks_preco: Option<PriceBenchmarks>,
    #[serde(default)]
    pub dados_quantitativos: Option<QuantitativeData>,
}

impl AnalystBrief {
    /// Validate a model payload and return its normalized form
    pub fn normalize(value: Value) -> Result<Value> {
        let brief: AnalystBrief =
            serde_json::from_value(value).wrap_err("analyst brief failed validation")?;
        Ok(serde_json::to_value(&brief)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorProfile {
    pub descricao: String,
    #[serde(default)]
    pub dimensao_mercado: Option<String>,
    #[serde(default)]
    pub tendencias_principais: Vec<String>,
    #[serde(default)]
    pub taxa_crescimento: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Competitor {
    pub nome: String,
    #[serde(default)]
    pub descricao: Option<String>,
    #[serde(default)]
    pub pontos_fortes: StringOrList,
    #[serde(default)]
    pub pontos_fracos: StringOrList,
    #[serde(default)]
    pub preco_referencia: Option<String>,
    #[serde(default)]
    pub posicionamento: Option<String>,
}

/// PESTEL factors; an empty object is acceptable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalContext {
    #[serde(default)]
    pub politico_legal: Vec<String>,
    #[serde(default)]
    pub economico: Vec<String>,
    #[serde(default)]
    pub sociocultural: Vec<String>,
    #[serde(default)]
    pub tecnologico: Vec<String>,
    #[serde(default)]
    pub ambiental: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceBenchmarks {
    #[serde(default)]
    pub faixa_baixa: Option<String>,
    #[serde(default)]
    pub faixa_media: Option<String>,
    #[serde(default)]
    pub faixa_alta: Option<String>,
    #[serde(default)]
    pub posicao_utilizador: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuantitativeData {
    #[serde(default)]
    pub fonte: Option<String>,
    #[serde(default)]
    pub metricas: Vec<String>,
}

/// Accepts either a bare string or a list of strings
///
/// Models occasionally return `"pontos_fortes": "preço baixo"` instead of a
/// list; both decode to the list form, and serialization always emits a list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct StringOrList(pub Vec<String>);

impl<'de> Deserialize<'de> for StringOrList {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(item) => StringOrList(vec![item]),
            Raw::Many(items) => StringOrList(items),
        })
    }
}

/// Critique produced by the reviewer stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutput {
    pub avaliacao_global: GlobalAssessment,
    #[serde(default)]
    pub pontos_fortes: Vec<String>,
    /// Issues the finalizer must fix; an empty list is a clean review
    pub problemas_criticos: Vec<CriticalIssue>,
    pub melhorias_recomendadas: Vec<Improvement>,
    #[serde(default)]
    pub inconsistencias: Vec<Inconsistency>,
    #[serde(default)]
    pub erros_linguagem: Vec<LanguageError>,
    #[serde(default)]
    pub seccoes_em_falta: Vec<String>,
    #[serde(default)]
    pub dados_analista_nao_usados: Vec<String>,
}

impl ReviewOutput {
    /// Validate a model payload and return its normalized form
    pub fn normalize(value: Value) -> Result<Value> {
        let review: ReviewOutput =
            serde_json::from_value(value).wrap_err("review failed validation")?;
        Ok(serde_json::to_value(&review)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalAssessment {
    /// Overall mark out of 10
    pub nota: f64,
    #[serde(default)]
    pub resumo: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriticalIssue {
    #[serde(default)]
    pub seccao: String,
    #[serde(default)]
    pub problema: String,
    #[serde(default)]
    pub sugestao_correcao: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Improvement {
    #[serde(default)]
    pub seccao: String,
    #[serde(default)]
    pub melhoria: String,
    #[serde(default)]
    pub prioridade: Priority,
    #[serde(default)]
    pub texto_sugerido: Option<String>,
}

/// Improvement priority as graded by the reviewer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Alta,
    #[serde(alias = "média")]
    #[default]
    Media,
    Baixa,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inconsistency {
    #[serde(default)]
    pub entre_seccoes: String,
    #[serde(default)]
    pub descricao: String,
    #[serde(default)]
    pub como_resolver: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageError {
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub correcao: String,
    #[serde(default)]
    pub tipo: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_brief() -> Value {
        json!({
            "setor": {
                "descricao": "Padarias artesanais em Lisboa",
                "dimensao_mercado": "Estimativa de 120M EUR anuais",
                "tendencias_principais": ["Fermentação lenta", "Entregas ao domicílio"],
                "taxa_crescimento": "3-5% ao ano"
            },
            "concorrentes": [
                {
                    "nome": "Pão Nosso",
                    "descricao": "Padaria de bairro com forte presença local",
                    "pontos_fortes": ["Localização central", "Clientela fiel"],
                    "pontos_fracos": ["Sem presença digital"],
                    "preco_referencia": "2-4 EUR por unidade",
                    "posicionamento": "Tradicional de proximidade"
                }
            ],
            "contexto_externo": {
                "politico_legal": ["Regulamento HACCP"],
                "economico": ["Inflação nos cereais"],
                "sociocultural": ["Procura por produtos artesanais"],
                "tecnologico": ["Encomendas online"],
                "ambiental": ["Embalagens recicláveis"]
            },
            "oportunidades_mercado": ["Parcerias com cafés locais"],
            "ameacas_mercado": ["Grandes superfícies"],
            "benchmarks_preco": {
                "faixa_baixa": "1,5 EUR",
                "faixa_media": "3 EUR",
                "faixa_alta": "6 EUR",
                "posicao_utilizador": "Na média"
            },
            "dados_quantitativos": {
                "fonte": "INE",
                "metricas": ["Consumo per capita de pão: 60kg/ano"]
            }
        })
    }

    #[test]
    fn test_brief_decodes_full_payload() {
        let brief: AnalystBrief = serde_json::from_value(full_brief()).unwrap();
        assert_eq!(brief.setor.descricao, "Padarias artesanais em Lisboa");
        assert_eq!(brief.concorrentes.len(), 1);
        assert_eq!(brief.concorrentes[0].pontos_fortes.0.len(), 2);
        assert_eq!(brief.contexto_externo.economico.len(), 1);
        assert!(brief.benchmarks_preco.is_some());
    }

    #[test]
    fn test_brief_requires_sector() {
        let mut value = full_brief();
        value.as_object_mut().unwrap().remove("setor");
        assert!(serde_json::from_value::<AnalystBrief>(value).is_err());
    }

    #[test]
    fn test_brief_defaults_auxiliary_fields() {
        let value = json!({
            "setor": {"descricao": "Setor de teste"},
            "concorrentes": [],
            "contexto_externo": {}
        });
        let brief: AnalystBrief = serde_json::from_value(value).unwrap();
        assert!(brief.oportunidades_mercado.is_empty());
        assert!(brief.ameacas_mercado.is_empty());
        assert!(brief.benchmarks_preco.is_none());
    }

    #[test]
    fn test_competitor_accepts_bare_string_strengths() {
        let value = json!({
            "nome": "Concorrente X",
            "pontos_fortes": "preço baixo",
            "pontos_fracos": ["pouca variedade", "horário reduzido"]
        });
        let competitor: Competitor = serde_json::from_value(value).unwrap();
        assert_eq!(competitor.pontos_fortes.0, vec!["preço baixo"]);
        assert_eq!(competitor.pontos_fracos.0.len(), 2);
    }

    #[test]
    fn test_normalize_emits_lists_for_bare_strings() {
        let value = json!({
            "setor": {"descricao": "Setor"},
            "concorrentes": [{"nome": "X", "pontos_fortes": "um único ponto"}],
            "contexto_externo": {}
        });
        let normalized = AnalystBrief::normalize(value).unwrap();
        assert_eq!(
            normalized["concorrentes"][0]["pontos_fortes"],
            json!(["um único ponto"])
        );
    }

    fn full_review() -> Value {
        json!({
            "avaliacao_global": {"nota": 7, "resumo": "Plano sólido com lacunas pontuais."},
            "pontos_fortes": ["SWOT bem fundamentada"],
            "problemas_criticos": [
                {
                    "seccao": "Secção 8",
                    "problema": "Orçamento total excede o indicado",
                    "sugestao_correcao": "Reduzir as ações de T3"
                }
            ],
            "melhorias_recomendadas": [
                {
                    "seccao": "Secção 6",
                    "melhoria": "Tornar o posicionamento mais específico",
                    "prioridade": "alta",
                    "texto_sugerido": "A única padaria de fermentação lenta do bairro"
                }
            ],
            "inconsistencias": [
                {
                    "entre_seccoes": "Secção 4 vs Secção 9",
                    "descricao": "KPIs não cobrem todos os objetivos",
                    "como_resolver": "Adicionar KPI de retenção"
                }
            ],
            "erros_linguagem": [
                {"original": "crescendo", "correcao": "a crescer", "tipo": "gerundio"}
            ],
            "seccoes_em_falta": [],
            "dados_analista_nao_usados": ["benchmarks_preco"]
        })
    }

    #[test]
    fn test_review_decodes_full_payload() {
        let review: ReviewOutput = serde_json::from_value(full_review()).unwrap();
        assert!((review.avaliacao_global.nota - 7.0).abs() < f64::EPSILON);
        assert_eq!(review.problemas_criticos.len(), 1);
        assert_eq!(review.melhorias_recomendadas[0].prioridade, Priority::Alta);
        assert_eq!(review.erros_linguagem[0].tipo, "gerundio");
    }

    #[test]
    fn test_review_requires_assessment() {
        let mut value = full_review();
        value.as_object_mut().unwrap().remove("avaliacao_global");
        assert!(serde_json::from_value::<ReviewOutput>(value).is_err());
    }

    #[test]
    fn test_review_defaults_auxiliary_lists() {
        let value = json!({
            "avaliacao_global": {"nota": 8.5},
            "problemas_criticos": [],
            "melhorias_recomendadas": []
        });
        let review: ReviewOutput = serde_json::from_value(value).unwrap();
        assert!(review.inconsistencias.is_empty());
        assert!(review.seccoes_em_falta.is_empty());
        assert_eq!(review.avaliacao_global.resumo, "");
    }

    #[test]
    fn test_priority_accepts_accented_media() {
        let improvement: Improvement = serde_json::from_value(json!({
            "seccao": "Secção 2",
            "melhoria": "Expandir a análise PESTEL",
            "prioridade": "média"
        }))
        .unwrap();
        assert_eq!(improvement.prioridade, Priority::Media);
    }

    #[test]
    fn test_priority_defaults_to_media_when_missing() {
        let improvement: Improvement =
            serde_json::from_value(json!({"melhoria": "Rever tabela"})).unwrap();
        assert_eq!(improvement.prioridade, Priority::Media);
    }
}
