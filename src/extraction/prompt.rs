// Extraction prompt sent alongside the uploaded document

/// Instruction block. The reference shape it describes (A, digit, B, 1-3
/// digits) is a hint for the model only; codes are never validated against it.
pub const EXTRACTION_PROMPT: &str = r#"Analyse ce document (un devis de location d'appartements à Cannes) et extrais TOUTES les références d'appartements.

Les références suivent le format "Ref." suivi d'un code comme : A1B205, A1B226, A0B123, A1B47, etc.
Le pattern est : la lettre A, puis un chiffre (0-9), puis la lettre B, puis un nombre (1 à 3 chiffres).

Retourne UNIQUEMENT un objet JSON valide avec les références trouvées, sans aucun texte avant ou après, sans backticks markdown.
Format exact attendu : {"references": ["A1B205", "A1B226", "A0B123"]}"#;
