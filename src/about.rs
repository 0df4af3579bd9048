//! Static "À propos" text.

pub const ABOUT: &str = "\
🌍 À propos de notre projet

Le Classificateur de déchets IA a été conçu dans le cadre du Hackathon \"IA for Good\".
Il vise à sensibiliser les citoyens au tri sélectif grâce à l'intelligence artificielle.

En utilisant des modèles IA comme Gemini, notre application permet à chacun d'apprendre
à trier ses déchets de façon simple, rapide et ludique.

♻️ Nos valeurs
  👉 Éducation écologique accessible
  🤖 Technologie au service de la planète
  🚀 Simplicité d'usage pour tous";
