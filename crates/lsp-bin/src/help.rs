//! The injected help document.

pub const HELP_NAME: &str = "*Help*";

pub const HELP_TEXT: &str = "\
lsp key bindings
================

Moving
   SPACE, f, PageDown    forward one page
   b, PageUp             back one page
   ENTER, j, Down        forward one line
   k, Up                 back one line
   d / u                 half page forward / back
   g, Home               go to top
   G, End                go to end
   Left / Right          shift view horizontally

Searching
   /                     search forward
   ?                     search backward
   n / p                 next / previous match
   ESC                   turn off highlighting

References
   TAB / Shift-TAB       next / previous man-page reference
   ENTER                 open the reference under the cursor

Documents
   m                     open a manual page by name
   a                     load the apropos list
   B                     list open documents
   c                     close the current document
   r                     reload the current document

Table of contents
   T                     open the TOC; cycle detail level
   ENTER                 jump to the selected entry
   q                     leave the TOC

Other
   -X                    toggle option X (i, c, n, h, V)
   CTRL-L                re-align the current match; twice to make
                         top-alignment the default
   h                     this help
   q                     quit
";
